//! Hierarchical region/template configuration store ("clickmap").
//!
//! The clickmap is a JSON object tree addressed by dot-separated paths.
//! Leaves describe match templates, regions, static tap/swipe coordinates
//! and free-text roles. The reserved `_shared_match_regions` root holds
//! reusable rectangles that entries point at via `region_ref`.
//!
//! Reads are pure lookups and safe to share across threads; structural
//! writes are expected only from authoring tools and must be serialized
//! by the caller.

pub mod types;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{PilotError, PilotResult};
pub use types::{ClickEntry, Region, SwipeSpec, TapOffset, TapPoint};

/// Reserved root for reusable regions.
pub const SHARED_REGIONS_ROOT: &str = "_shared_match_regions";

#[derive(Debug)]
pub struct Clickmap {
    root: Value,
    path: Option<PathBuf>,
}

impl Clickmap {
    /// Load a clickmap document from disk.
    pub fn load(path: impl AsRef<Path>) -> PilotResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let root: Value = serde_json::from_str(&text)?;
        Ok(Self {
            root,
            path: Some(path.to_path_buf()),
        })
    }

    /// Build a store from an in-memory JSON value. `save` requires a path
    /// to have been attached with [`Clickmap::with_path`].
    pub fn from_value(root: Value) -> Self {
        Self { root, path: None }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Resolve a dot-path to a node. Returns `None` if any segment is
    /// missing or a non-object is traversed.
    pub fn resolve(&self, dot_path: &str) -> Option<&Value> {
        let mut cur = &self.root;
        for part in dot_path.split('.') {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    pub fn exists(&self, dot_path: &str) -> bool {
        self.resolve(dot_path).is_some()
    }

    /// Set a value at a dot-path, creating intermediate objects as needed.
    ///
    /// Fails with `KeyConflict` if the terminal key already exists and
    /// `allow_overwrite` is false, and with `NotAContainer` if an
    /// intermediate segment resolves to a non-object. On failure the
    /// store is left unchanged.
    pub fn set(&mut self, dot_path: &str, value: Value, allow_overwrite: bool) -> PilotResult<()> {
        let parts: Vec<&str> = dot_path.split('.').collect();
        let (last, intermediate) = parts
            .split_last()
            .expect("split('.') yields at least one segment");

        // Validate the walk before mutating anything.
        let mut probe = Some(&self.root);
        for part in intermediate {
            match probe {
                Some(Value::Object(map)) => {
                    if let Some(next) = map.get(*part) {
                        if !next.is_object() {
                            return Err(PilotError::NotAContainer {
                                path: dot_path.to_string(),
                                segment: (*part).to_string(),
                            });
                        }
                        probe = Some(next);
                    } else {
                        probe = None;
                    }
                }
                Some(_) | None => {
                    probe = None;
                }
            }
        }
        if let Some(Value::Object(map)) = probe
            && map.contains_key(*last)
            && !allow_overwrite
        {
            return Err(PilotError::KeyConflict {
                path: dot_path.to_string(),
            });
        }

        let mut cur = &mut self.root;
        for part in intermediate {
            let map = cur
                .as_object_mut()
                .expect("validated walk only traverses objects");
            cur = map
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
        let map = cur
            .as_object_mut()
            .expect("validated walk only traverses objects");
        map.insert((*last).to_string(), value);
        Ok(())
    }

    /// Atomically persist the store: write to `<path>.tmp`, then rename
    /// over the target so a crash mid-write never corrupts the document.
    pub fn save(&self) -> PilotResult<()> {
        let path = self.path.as_ref().ok_or_else(|| PilotError::Io(
            std::io::Error::other("clickmap has no backing path"),
        ))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let text = serde_json::to_string_pretty(&self.root)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path)?;
        log::info!("Saved clickmap to {}", path.display());
        Ok(())
    }

    /// Typed view of a leaf entry.
    pub fn entry(&self, dot_path: &str) -> PilotResult<ClickEntry> {
        let value = self
            .resolve(dot_path)
            .ok_or_else(|| PilotError::EntryNotFound {
                path: dot_path.to_string(),
            })?;
        serde_json::from_value(value.clone()).map_err(|e| PilotError::MalformedEntry {
            path: dot_path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Resolve an entry's region: inline rect, or indirection through the
    /// shared-region namespace. Exactly one of the two must be present.
    pub fn resolve_region(&self, dot_path: &str, entry: &ClickEntry) -> PilotResult<Region> {
        match (&entry.match_region, &entry.region_ref) {
            (Some(_), Some(_)) => Err(PilotError::AmbiguousRegion {
                path: dot_path.to_string(),
            }),
            (Some(region), None) => Ok(*region),
            (None, Some(reference)) => {
                let shared_path = format!("{SHARED_REGIONS_ROOT}.{reference}");
                let shared = self.entry(&shared_path).map_err(|_| {
                    PilotError::UnknownRegionRef {
                        reference: reference.clone(),
                    }
                })?;
                shared
                    .match_region
                    .ok_or_else(|| PilotError::UnknownRegionRef {
                        reference: reference.clone(),
                    })
            }
            (None, None) => Err(PilotError::MissingRegion {
                path: dot_path.to_string(),
            }),
        }
    }

    /// Tap coordinates for an entry: an explicit `tap` literal, or the
    /// center of its resolved region.
    pub fn click_point(&self, dot_path: &str) -> Option<(u32, u32)> {
        let entry = self.entry(dot_path).ok()?;
        if let Some(tap) = entry.tap {
            return Some((tap.x, tap.y));
        }
        self.resolve_region(dot_path, &entry)
            .ok()
            .map(|r| r.center())
    }

    pub fn swipe(&self, dot_path: &str) -> Option<SwipeSpec> {
        self.entry(dot_path).ok()?.swipe
    }

    /// Flatten the tree into a dot-path → leaf map (non-object leaves).
    pub fn flatten(&self) -> BTreeMap<String, &Value> {
        let mut out = BTreeMap::new();
        fn walk<'a>(value: &'a Value, prefix: &str, out: &mut BTreeMap<String, &'a Value>) {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        let full = if prefix.is_empty() {
                            key.clone()
                        } else {
                            format!("{prefix}.{key}")
                        };
                        walk(child, &full, out);
                    }
                }
                leaf => {
                    out.insert(prefix.to_string(), leaf);
                }
            }
        }
        walk(&self.root, "", &mut out);
        out
    }

    /// All entries whose `roles` list contains `role`, with their dot-paths.
    pub fn entries_by_role(&self, role: &str) -> Vec<(String, ClickEntry)> {
        let mut out = Vec::new();
        fn walk(value: &Value, prefix: &str, role: &str, out: &mut Vec<(String, ClickEntry)>) {
            if let Value::Object(map) = value {
                if map.contains_key("roles")
                    && let Ok(entry) = serde_json::from_value::<ClickEntry>(value.clone())
                    && entry.has_role(role)
                {
                    out.push((prefix.to_string(), entry));
                }
                for (key, child) in map {
                    let full = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(child, &full, role, out);
                }
            }
        }
        walk(&self.root, "", role, &mut out);
        out
    }
}
