//! Frame classification against declarative state/overlay definitions.
//!
//! Two passes per frame: the states pass picks the primary (exactly one),
//! the winning menu (first in declaration order) and any secondaries; the
//! overlays pass then annotates independently, so overlays can never
//! perturb primary/menu selection.

pub mod types;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::GrayImage;

use crate::clickmap::Clickmap;
use crate::error::{PilotError, PilotResult};
use crate::matching::{DetectorRegistry, RegionMatcher};
pub use types::{
    FloatingButton, FrameClassification, OverlayDefinition, StateDefinition, StateDefinitions,
    StateKind, UNKNOWN_STATE,
};

/// Role marking clickmap entries as floating controls.
pub const FLOATING_BUTTON_ROLE: &str = "floating_button";

/// Perception seam consumed by the mission orchestrator; lets tests drive
/// the orchestrator with stub frames.
pub trait Detector: Send + Sync {
    fn classify_frame(&self, screen: &GrayImage) -> PilotResult<FrameClassification>;
    fn detect_floating_buttons(&self, screen: &GrayImage) -> PilotResult<Vec<FloatingButton>>;
    /// Locate a single clickmap entry on screen, returning its tap point
    /// (entry `tap_offset` applied) when visible.
    fn locate(&self, screen: &GrayImage, key: &str) -> PilotResult<Option<(u32, u32)>>;
}

/// Template-matching classifier over the clickmap.
pub struct StateClassifier {
    definitions: StateDefinitions,
    clickmap: Arc<Clickmap>,
    matcher: RegionMatcher,
    detectors: DetectorRegistry,
}

impl StateClassifier {
    /// Build a classifier, eagerly validating the definitions against the
    /// clickmap and the detector registry: every definition needs at least
    /// one resolvable match key, and every `detector` name referenced by a
    /// match key must be registered.
    pub fn new(
        definitions: StateDefinitions,
        clickmap: Arc<Clickmap>,
        matcher: RegionMatcher,
        detectors: DetectorRegistry,
    ) -> PilotResult<Self> {
        let classifier = Self {
            definitions,
            clickmap,
            matcher,
            detectors,
        };
        classifier.validate()?;
        Ok(classifier)
    }

    /// Load the declaration document from a JSON file.
    pub fn load_definitions(path: impl AsRef<Path>) -> PilotResult<StateDefinitions> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    fn validate(&self) -> PilotResult<()> {
        let mut check_keys = |owner: &str, keys: &[String]| -> PilotResult<()> {
            if keys.is_empty() {
                return Err(PilotError::InvalidStateDefinitions {
                    reason: format!("'{owner}' has no match_keys"),
                });
            }
            let mut usable = 0;
            for key in keys {
                let Ok(entry) = self.clickmap.entry(key) else {
                    log::warn!("[DEFS] '{owner}': dangling match_key {key}");
                    continue;
                };
                if let Some(name) = &entry.detector
                    && !self.detectors.contains(name)
                {
                    return Err(PilotError::UnknownDetector {
                        name: name.clone(),
                        path: key.clone(),
                    });
                }
                usable += 1;
            }
            if usable == 0 {
                return Err(PilotError::InvalidStateDefinitions {
                    reason: format!("'{owner}' has no match_keys that resolve in the clickmap"),
                });
            }
            Ok(())
        };

        for state in &self.definitions.states {
            check_keys(&state.name, &state.match_keys)?;
        }
        for overlay in &self.definitions.overlays {
            check_keys(&overlay.name, &overlay.match_keys)?;
        }
        Ok(())
    }

    /// Try a definition's match keys in order; first hit wins. Unresolved
    /// keys are skipped; configuration errors from the matcher propagate.
    fn any_key_matches(&self, screen: &GrayImage, owner: &str, keys: &[String]) -> PilotResult<bool> {
        for key in keys {
            let Ok(entry) = self.clickmap.entry(key) else {
                log::debug!("[CLASSIFY] {owner}: could not resolve {key}");
                continue;
            };

            if let Some(detector_name) = &entry.detector {
                let region = self.clickmap.resolve_region(key, &entry)?;
                match self.detectors.run(detector_name, screen, &region) {
                    Some(true) => {
                        log::debug!("[MATCH] {owner} via detector {detector_name}");
                        return Ok(true);
                    }
                    Some(false) => continue,
                    // validated at construction; a miss here means the
                    // registry changed underneath us
                    None => {
                        return Err(PilotError::UnknownDetector {
                            name: detector_name.clone(),
                            path: key.clone(),
                        });
                    }
                }
            }

            if entry.match_template.is_none() {
                log::debug!("[CLASSIFY] {owner}: {key} has no match_template, skipping");
                continue;
            }
            let (point, confidence) = self.matcher.match_entry(screen, &self.clickmap, key, &entry)?;
            if let Some(point) = point {
                log::debug!("[MATCH] {owner} via {key} at {point:?} ({confidence:.3})");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Detector for StateClassifier {
    fn classify_frame(&self, screen: &GrayImage) -> PilotResult<FrameClassification> {
        let mut result = FrameClassification::unknown();

        // States pass: primary/menu/secondary in declaration order.
        for definition in &self.definitions.states {
            if !self.any_key_matches(screen, &definition.name, &definition.match_keys)? {
                continue;
            }
            match definition.kind {
                StateKind::Primary => {
                    if result.state != UNKNOWN_STATE {
                        return Err(PilotError::MultiplePrimaryStates {
                            first: result.state.clone(),
                            second: definition.name.clone(),
                        });
                    }
                    result.state = definition.name.clone();
                }
                StateKind::Menu => {
                    if let Some(winner) = &result.menu {
                        log::warn!(
                            "[CLASSIFY] Multiple menus matched: keeping '{winner}', ignoring '{}'",
                            definition.name
                        );
                    } else {
                        result.menu = Some(definition.name.clone());
                    }
                }
                StateKind::Secondary => {
                    result.secondary_states.insert(definition.name.clone());
                }
            }
        }

        // Overlays pass: independent annotations, all matches reported.
        for overlay in &self.definitions.overlays {
            if self.any_key_matches(screen, &overlay.name, &overlay.match_keys)? {
                result.overlays.insert(overlay.name.clone());
            }
        }

        Ok(result)
    }

    fn detect_floating_buttons(&self, screen: &GrayImage) -> PilotResult<Vec<FloatingButton>> {
        let mut buttons = Vec::new();
        for (name, entry) in self.clickmap.entries_by_role(FLOATING_BUTTON_ROLE) {
            let (point, confidence) =
                self.matcher.match_entry(screen, &self.clickmap, &name, &entry)?;
            match point {
                Some(point) => buttons.push(FloatingButton {
                    name,
                    point,
                    confidence,
                }),
                None => log::debug!("[FLOATING] {name} not matched (conf={confidence:.2})"),
            }
        }
        Ok(buttons)
    }

    fn locate(&self, screen: &GrayImage, key: &str) -> PilotResult<Option<(u32, u32)>> {
        let entry = self.clickmap.entry(key)?;
        let (point, confidence) = self.matcher.match_entry(screen, &self.clickmap, key, &entry)?;
        let Some((x, y)) = point else {
            log::debug!("[LOCATE] {key} not visible (conf={confidence:.2})");
            return Ok(None);
        };
        let point = match entry.tap_offset {
            Some(offset) => (
                x.saturating_add_signed(offset.x),
                y.saturating_add_signed(offset.y),
            ),
            None => (x, y),
        };
        Ok(Some(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::test_support::{checkerboard, screen_with_patch};
    use image::{GrayImage, Luma};
    use serde_json::json;
    use std::path::Path;

    fn write_template(dir: &Path, name: &str, img: &GrayImage) {
        img.save(dir.join(name)).unwrap();
    }

    /// Fixture: two distinct 8x8 patches at (10,10) and (60,60) on a
    /// 100x100 screen, plus an absent third template.
    struct Fixture {
        _dir: tempfile::TempDir,
        assets: std::path::PathBuf,
        clickmap: Arc<Clickmap>,
        screen: GrayImage,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let a = checkerboard(10, 240);
        let b = checkerboard(80, 160);
        let absent = GrayImage::from_fn(8, 8, |x, _| Luma([if x < 4 { 255 } else { 0 }]));
        write_template(dir.path(), "a.png", &a);
        write_template(dir.path(), "b.png", &b);
        write_template(dir.path(), "absent.png", &absent);

        let mut screen = screen_with_patch(100, 100, 128, &a, 10, 10);
        image::imageops::overlay(&mut screen, &b, 60, 60);

        let clickmap = Arc::new(Clickmap::from_value(json!({
            "marks": {
                "a": {"match_template": "a.png", "match_region": {"x": 8, "y": 8, "w": 12, "h": 12}},
                "b": {"match_template": "b.png", "match_region": {"x": 58, "y": 58, "w": 12, "h": 12}},
                "absent": {"match_template": "absent.png", "match_region": {"x": 30, "y": 30, "w": 12, "h": 12}},
                "float": {
                    "match_template": "b.png",
                    "match_region": {"x": 58, "y": 58, "w": 12, "h": 12},
                    "roles": ["floating_button"]
                }
            }
        })));
        Fixture {
            assets: dir.path().to_path_buf(),
            _dir: dir,
            clickmap,
            screen,
        }
    }

    fn defs(json: serde_json::Value) -> StateDefinitions {
        serde_json::from_value(json).unwrap()
    }

    fn classifier(fx: &Fixture, definitions: StateDefinitions) -> StateClassifier {
        StateClassifier::new(
            definitions,
            fx.clickmap.clone(),
            RegionMatcher::new(&fx.assets),
            DetectorRegistry::new(),
        )
        .unwrap()
    }

    #[test]
    fn single_primary_with_secondary_and_overlay() {
        let fx = fixture();
        let c = classifier(
            &fx,
            defs(json!({
                "states": [
                    {"name": "RUNNING", "type": "primary", "match_keys": ["marks.a"]},
                    {"name": "BOOSTED", "type": "secondary", "match_keys": ["marks.b"]}
                ],
                "overlays": [
                    {"name": "REWARD", "match_keys": ["marks.b"]},
                    {"name": "NOT_THERE", "match_keys": ["marks.absent"]}
                ]
            })),
        );
        let frame = c.classify_frame(&fx.screen).unwrap();
        assert_eq!(frame.state, "RUNNING");
        assert!(frame.secondary_states.contains("BOOSTED"));
        assert!(frame.has_overlay("REWARD"));
        assert!(!frame.has_overlay("NOT_THERE"));
        assert_eq!(frame.menu, None);
    }

    #[test]
    fn two_primaries_raise_before_returning() {
        let fx = fixture();
        let c = classifier(
            &fx,
            defs(json!({
                "states": [
                    {"name": "RUNNING", "type": "primary", "match_keys": ["marks.a"]},
                    {"name": "GAME_OVER", "type": "primary", "match_keys": ["marks.b"]}
                ],
                "overlays": []
            })),
        );
        let err = c.classify_frame(&fx.screen).unwrap_err();
        assert!(matches!(err, PilotError::MultiplePrimaryStates { .. }));
    }

    #[test]
    fn first_declared_menu_wins() {
        let fx = fixture();
        let c = classifier(
            &fx,
            defs(json!({
                "states": [
                    {"name": "UPGRADES", "type": "menu", "match_keys": ["marks.a"]},
                    {"name": "SETTINGS", "type": "menu", "match_keys": ["marks.b"]}
                ],
                "overlays": []
            })),
        );
        let frame = c.classify_frame(&fx.screen).unwrap();
        assert_eq!(frame.menu.as_deref(), Some("UPGRADES"));
        assert_eq!(frame.state, UNKNOWN_STATE);
    }

    #[test]
    fn first_successful_match_key_wins_per_definition() {
        let fx = fixture();
        let c = classifier(
            &fx,
            defs(json!({
                "states": [
                    {"name": "RUNNING", "type": "primary",
                     "match_keys": ["marks.missing_key", "marks.absent", "marks.a"]}
                ],
                "overlays": []
            })),
        );
        // unresolved key skipped, unmatched key skipped, third one matches
        let frame = c.classify_frame(&fx.screen).unwrap();
        assert_eq!(frame.state, "RUNNING");
    }

    #[test]
    fn no_primary_reports_unknown() {
        let fx = fixture();
        let c = classifier(
            &fx,
            defs(json!({
                "states": [
                    {"name": "GAME_OVER", "type": "primary", "match_keys": ["marks.absent"]}
                ],
                "overlays": []
            })),
        );
        let frame = c.classify_frame(&fx.screen).unwrap();
        assert_eq!(frame.state, UNKNOWN_STATE);
    }

    #[test]
    fn construction_rejects_definitions_with_no_resolvable_keys() {
        let fx = fixture();
        let err = StateClassifier::new(
            defs(json!({
                "states": [
                    {"name": "GHOST", "type": "primary", "match_keys": ["nowhere.at_all"]}
                ],
                "overlays": []
            })),
            fx.clickmap.clone(),
            RegionMatcher::new(&fx.assets),
            DetectorRegistry::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PilotError::InvalidStateDefinitions { .. }));
    }

    #[test]
    fn construction_rejects_unknown_detector_names() {
        let fx = fixture();
        let clickmap = Arc::new(Clickmap::from_value(json!({
            "marks": {"pink": {
                "detector": "pink_square",
                "match_region": {"x": 0, "y": 0, "w": 10, "h": 10}
            }}
        })));
        let err = StateClassifier::new(
            defs(json!({
                "states": [],
                "overlays": [{"name": "GEM", "match_keys": ["marks.pink"]}]
            })),
            clickmap,
            RegionMatcher::new(&fx.assets),
            DetectorRegistry::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PilotError::UnknownDetector { .. }));
    }

    #[test]
    fn detector_overlays_run_registered_strategy() {
        let fx = fixture();
        let clickmap = Arc::new(Clickmap::from_value(json!({
            "marks": {"pink": {
                "detector": "pink_square",
                "match_region": {"x": 0, "y": 0, "w": 10, "h": 10}
            }}
        })));
        let mut registry = DetectorRegistry::new();
        registry.register("pink_square", |_screen, region| region.w == 10);
        let c = StateClassifier::new(
            defs(json!({
                "states": [],
                "overlays": [{"name": "GEM", "match_keys": ["marks.pink"]}]
            })),
            clickmap,
            RegionMatcher::new(&fx.assets),
            registry,
        )
        .unwrap();
        let frame = c.classify_frame(&fx.screen).unwrap();
        assert!(frame.has_overlay("GEM"));
    }

    #[test]
    fn locate_reports_visibility_without_raising() {
        let fx = fixture();
        let c = classifier(
            &fx,
            defs(json!({
                "states": [{"name": "RUNNING", "type": "primary", "match_keys": ["marks.a"]}],
                "overlays": []
            })),
        );
        assert_eq!(c.locate(&fx.screen, "marks.a").unwrap(), Some((14, 14)));
        assert_eq!(c.locate(&fx.screen, "marks.absent").unwrap(), None);
        assert!(matches!(
            c.locate(&fx.screen, "marks.no_such").unwrap_err(),
            PilotError::EntryNotFound { .. }
        ));
    }

    #[test]
    fn floating_buttons_report_name_point_confidence() {
        let fx = fixture();
        let c = classifier(
            &fx,
            defs(json!({
                "states": [{"name": "RUNNING", "type": "primary", "match_keys": ["marks.a"]}],
                "overlays": []
            })),
        );
        let buttons = c.detect_floating_buttons(&fx.screen).unwrap();
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].name, "marks.float");
        assert_eq!(buttons[0].point, (64, 64));
        assert!(buttons[0].confidence > 0.99);
    }
}
