//! Typed views over clickmap leaf entries.

use serde::{Deserialize, Serialize};

/// Rectangle in full-screen coordinates, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    /// Expand by `padding` on every side, clamped to a `width`x`height`
    /// image. Returns the expanded rect as (x1, y1, x2, y2).
    pub fn expanded_clamped(&self, padding: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x1 = self.x.saturating_sub(padding);
        let y1 = self.y.saturating_sub(padding);
        let x2 = (self.x + self.w + padding).min(width);
        let y2 = (self.y + self.h + padding).min(height);
        (x1, y1, x2, y2)
    }

    pub fn is_valid(&self) -> bool {
        self.w > 0 && self.h > 0
    }
}

/// Static tap coordinates stored directly on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapPoint {
    pub x: u32,
    pub y: u32,
}

/// Offset applied to a matched point before tapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapOffset {
    pub x: i32,
    pub y: i32,
}

/// Swipe gesture literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeSpec {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub duration_ms: u32,
}

fn default_threshold() -> f32 {
    0.90
}

fn default_padding() -> u32 {
    12
}

/// A clickmap leaf. Every field is optional in the document; which subset
/// is present determines what the entry can be used for (matching,
/// tapping, swiping, or as a shared region).
#[derive(Debug, Clone, Deserialize)]
pub struct ClickEntry {
    /// Template image path, relative to the assets directory.
    pub match_template: Option<String>,
    /// Inline region; mutually exclusive with `region_ref`.
    pub match_region: Option<Region>,
    /// Name resolved under the `_shared_match_regions` root.
    pub region_ref: Option<String>,
    #[serde(default = "default_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_padding")]
    pub match_padding: u32,
    /// Named pixel-detector strategy instead of template matching.
    pub detector: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub tap: Option<TapPoint>,
    pub tap_offset: Option<TapOffset>,
    pub swipe: Option<SwipeSpec>,
}

impl ClickEntry {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_defaults() {
        let entry: ClickEntry = serde_json::from_value(serde_json::json!({
            "match_template": "buttons/retry.png",
            "match_region": {"x": 10, "y": 20, "w": 30, "h": 40}
        }))
        .unwrap();
        assert!((entry.match_threshold - 0.90).abs() < f32::EPSILON);
        assert_eq!(entry.match_padding, 12);
        assert!(entry.roles.is_empty());
    }

    #[test]
    fn region_expansion_clamps_to_bounds() {
        let region = Region {
            x: 5,
            y: 5,
            w: 20,
            h: 20,
        };
        let (x1, y1, x2, y2) = region.expanded_clamped(12, 30, 30);
        assert_eq!((x1, y1), (0, 0));
        assert_eq!((x2, y2), (30, 30));
    }
}
