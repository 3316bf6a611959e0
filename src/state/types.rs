//! Declarative state/overlay definitions and per-frame classification.

use std::collections::BTreeSet;

use serde::Deserialize;

/// Name reported when no primary state matched.
pub const UNKNOWN_STATE: &str = "UNKNOWN";

/// Classification category; exclusivity rules differ per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    /// Exactly one may match per frame; two is a contract violation.
    Primary,
    /// Mutually exclusive; first in declaration order wins.
    Menu,
    /// May co-occur freely.
    Secondary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StateKind,
    /// Clickmap dot-paths tried in order; first successful match wins.
    pub match_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayDefinition {
    pub name: String,
    pub match_keys: Vec<String>,
}

/// The state/overlay declaration document, loaded at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct StateDefinitions {
    #[serde(default)]
    pub states: Vec<StateDefinition>,
    #[serde(default)]
    pub overlays: Vec<OverlayDefinition>,
}

/// Structured classification of a single frame. Produced fresh per frame,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameClassification {
    /// Primary state name, or [`UNKNOWN_STATE`].
    pub state: String,
    pub secondary_states: BTreeSet<String>,
    /// The winning menu, if any menu-typed definition matched.
    pub menu: Option<String>,
    pub overlays: BTreeSet<String>,
}

impl FrameClassification {
    pub fn unknown() -> Self {
        Self {
            state: UNKNOWN_STATE.to_string(),
            secondary_states: BTreeSet::new(),
            menu: None,
            overlays: BTreeSet::new(),
        }
    }

    pub fn is_state(&self, name: &str) -> bool {
        self.state == name
    }

    pub fn has_overlay(&self, name: &str) -> bool {
        self.overlays.contains(name)
    }
}

/// A floating control detected on screen, ready to tap.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatingButton {
    /// Clickmap dot-path of the entry that matched.
    pub name: String,
    /// Tap point (template center, full-image coordinates).
    pub point: (u32, u32),
    pub confidence: f32,
}
