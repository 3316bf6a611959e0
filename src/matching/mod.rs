//! Region-constrained template matching.
//!
//! Entries name a template image and a region (inline or shared). The
//! matcher expands the region by the entry's padding, clamps it to the
//! screenshot, runs normalized cross-correlation and reports the best
//! point in full-image coordinates. The confidence is returned even when
//! the match fails the threshold so callers can log diagnostics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::GrayImage;
use imageproc::template_matching::{MatchTemplateMethod, match_template};

use crate::clickmap::{ClickEntry, Clickmap, Region};
use crate::error::{PilotError, PilotResult};

/// Named pixel-detector strategy: an alternative to template matching for
/// elements that are easier to find by color/shape analysis.
pub type DetectorFn = dyn Fn(&GrayImage, &Region) -> bool + Send + Sync;

/// Registry of detector strategies, populated at startup and validated
/// eagerly against the configuration (unknown names fail fast rather than
/// at match time).
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: HashMap<String, Box<DetectorFn>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        detector: impl Fn(&GrayImage, &Region) -> bool + Send + Sync + 'static,
    ) {
        self.detectors.insert(name.into(), Box::new(detector));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.detectors.contains_key(name)
    }

    pub fn run(&self, name: &str, screen: &GrayImage, region: &Region) -> Option<bool> {
        self.detectors.get(name).map(|f| f(screen, region))
    }
}

/// Template matcher with a per-process template cache.
pub struct RegionMatcher {
    assets_dir: PathBuf,
    cache: Mutex<HashMap<String, GrayImage>>,
}

impl RegionMatcher {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Match `entry`'s template inside its (padded) region of `screen`.
    ///
    /// Returns `(Some(point), confidence)` on success, `(None, confidence)`
    /// when the best correlation stays below the entry's threshold. A
    /// missing or unloadable template is a configuration error, not a
    /// detection miss.
    pub fn match_entry(
        &self,
        screen: &GrayImage,
        clickmap: &Clickmap,
        dot_path: &str,
        entry: &ClickEntry,
    ) -> PilotResult<(Option<(u32, u32)>, f32)> {
        let template_name =
            entry
                .match_template
                .as_deref()
                .ok_or_else(|| PilotError::MalformedEntry {
                    path: dot_path.to_string(),
                    reason: "no match_template".to_string(),
                })?;
        let template = self.template(template_name)?;
        let region = clickmap.resolve_region(dot_path, entry)?;

        let (width, height) = screen.dimensions();
        let (x1, y1, x2, y2) = region.expanded_clamped(entry.match_padding, width, height);
        if x2 <= x1 || y2 <= y1 {
            return Err(PilotError::RegionOutOfBounds {
                path: dot_path.to_string(),
                width,
                height,
            });
        }
        let search_w = x2 - x1;
        let search_h = y2 - y1;
        if template.width() > search_w || template.height() > search_h {
            return Err(PilotError::TemplateLargerThanRegion {
                path: self.assets_dir.join(template_name),
            });
        }

        let search = image::imageops::crop_imm(screen, x1, y1, search_w, search_h).to_image();
        let scores = match_template(
            &search,
            &template,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );

        let mut best_score = f32::MIN;
        let mut best_xy = (0u32, 0u32);
        for (x, y, pixel) in scores.enumerate_pixels() {
            if pixel[0] > best_score {
                best_score = pixel[0];
                best_xy = (x, y);
            }
        }

        if best_score >= entry.match_threshold {
            let point = (
                x1 + best_xy.0 + template.width() / 2,
                y1 + best_xy.1 + template.height() / 2,
            );
            Ok((Some(point), best_score))
        } else {
            Ok((None, best_score))
        }
    }

    /// Load a template (cached). Relative to the assets directory.
    fn template(&self, name: &str) -> PilotResult<GrayImage> {
        if let Some(cached) = self
            .cache
            .lock()
            .expect("template cache poisoned")
            .get(name)
        {
            return Ok(cached.clone());
        }

        let path = self.assets_dir.join(name);
        if !path.exists() {
            return Err(PilotError::TemplateNotFound { path });
        }
        let template = image::open(&path)
            .map_err(|e| PilotError::TemplateLoadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .to_luma8();
        self.cache
            .lock()
            .expect("template cache poisoned")
            .insert(name.to_string(), template.clone());
        Ok(template)
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use image::Luma;

    /// 8x8 checkerboard template; non-uniform so normalized correlation is
    /// well-defined and discriminative.
    pub fn checkerboard(dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(8, 8, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([light])
            } else {
                Luma([dark])
            }
        })
    }

    /// Uniform screen with `patch` pasted at (x, y).
    pub fn screen_with_patch(
        width: u32,
        height: u32,
        fill: u8,
        patch: &GrayImage,
        x: u32,
        y: u32,
    ) -> GrayImage {
        let mut screen = GrayImage::from_pixel(width, height, Luma([fill]));
        image::imageops::overlay(&mut screen, patch, x as i64, y as i64);
        screen
    }
}
