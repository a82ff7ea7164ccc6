//! Template matching over grayscale screen captures.

use super::{Point, SearchRegion};
use crate::error::AutomationError;
use image::GrayImage;
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Matching gets very slow past these sizes, so larger searches are skipped.
const MAX_TEMPLATE_PIXELS: u64 = 1_000_000;
const MAX_SEARCH_PIXELS: u64 = 5_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchHit {
    /// Centre of the matched area in screen coordinates.
    pub center: Point,
    pub score: f32,
}

/// Loads templates from a directory on first use and keeps them in memory.
pub struct TemplateMatcher {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Arc<GrayImage>>>,
}

impl TemplateMatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn template(&self, name: &str) -> Result<Arc<GrayImage>, AutomationError> {
        if let Some(found) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(found));
        }

        let path = self.dir.join(name);
        let loaded = image::open(&path)
            .map_err(|source| AutomationError::TemplateLoad {
                path: path.clone(),
                source,
            })?
            .to_luma8();
        log::debug!(
            "🖼️ Loaded template '{}' ({}x{})",
            name,
            loaded.width(),
            loaded.height()
        );
        let loaded = Arc::new(loaded);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Search `screen` for the named template. Without an explicit region the
    /// one encoded in the template file name is used, else the whole screen.
    pub fn find(
        &self,
        screen: &GrayImage,
        name: &str,
        region: Option<&SearchRegion>,
        threshold: f32,
    ) -> Result<Option<MatchHit>, AutomationError> {
        let template = self.template(name)?;
        let region = match region {
            Some(region) => region.clone().clip_to(screen.width(), screen.height()),
            None => SearchRegion::from_template_name(name, screen.width(), screen.height()),
        };
        let hit = best_match(screen, &template, &region);
        match hit {
            Some(hit) if hit.score >= threshold => {
                log::debug!("🎯 '{}' matched at {} (score {:.3})", name, hit.center, hit.score);
                Ok(Some(hit))
            }
            Some(hit) => {
                log::debug!("🔍 '{}' best score {:.3} below {:.2}", name, hit.score, threshold);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Copy of the part of `screen` covered by `region` (clipped to the frame).
pub fn crop(screen: &GrayImage, region: &SearchRegion) -> GrayImage {
    let region = region.clone().clip_to(screen.width(), screen.height());
    image::imageops::crop_imm(screen, region.x, region.y, region.width, region.height).to_image()
}

/// Best normalized cross-correlation match of `template` inside `region`.
/// `None` when the template does not fit or the search would be too large.
pub fn best_match(screen: &GrayImage, template: &GrayImage, region: &SearchRegion) -> Option<MatchHit> {
    let area = crop(screen, region);
    if template.width() == 0
        || template.height() == 0
        || template.width() > area.width()
        || template.height() > area.height()
    {
        log::debug!(
            "⚠️ Template {}x{} does not fit search area {}x{}",
            template.width(),
            template.height(),
            area.width(),
            area.height()
        );
        return None;
    }

    let template_pixels = template.width() as u64 * template.height() as u64;
    let search_pixels = area.width() as u64 * area.height() as u64;
    if template_pixels > MAX_TEMPLATE_PIXELS || search_pixels > MAX_SEARCH_PIXELS {
        log::warn!(
            "⚠️ Skipping oversized match: template={}x{}, search={}x{}",
            template.width(),
            template.height(),
            area.width(),
            area.height()
        );
        return None;
    }

    let scores = match_template(&area, template, MatchTemplateMethod::CrossCorrelationNormalized);
    let extremes = find_extremes(&scores);
    let (mx, my) = extremes.max_value_location;
    let origin_x = region.x.min(screen.width().saturating_sub(1));
    let origin_y = region.y.min(screen.height().saturating_sub(1));
    Some(MatchHit {
        center: Point::new(
            origin_x + mx + template.width() / 2,
            origin_y + my + template.height() / 2,
        ),
        score: extremes.max_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Flat background with a small gradient patch at (`px`, `py`).
    fn screen_with_patch(px: u32, py: u32) -> (GrayImage, GrayImage) {
        let mut screen = GrayImage::from_pixel(60, 40, Luma([12]));
        let template = GrayImage::from_fn(6, 6, |x, y| Luma([60 + (x * 6 + y) as u8 * 5]));
        for (x, y, pixel) in template.enumerate_pixels() {
            screen.put_pixel(px + x, py + y, *pixel);
        }
        (screen, template)
    }

    #[test]
    fn test_best_match_finds_patch_centre() {
        let (screen, template) = screen_with_patch(20, 10);
        let hit = best_match(&screen, &template, &SearchRegion::full_screen(60, 40)).unwrap();

        assert_eq!(hit.center, Point::new(23, 13));
        assert!(hit.score > 0.99, "score was {}", hit.score);
    }

    #[test]
    fn test_match_inside_region_reports_screen_coordinates() {
        let (screen, template) = screen_with_patch(40, 25);
        let region = SearchRegion::new(30, 20, 25, 15);
        let hit = best_match(&screen, &template, &region).unwrap();

        assert_eq!(hit.center, Point::new(43, 28));
    }

    #[test]
    fn test_template_larger_than_region_is_skipped() {
        let (screen, template) = screen_with_patch(0, 0);
        assert!(best_match(&screen, &template, &SearchRegion::new(0, 0, 4, 4)).is_none());
    }

    #[test]
    fn crop_clips_to_frame() {
        let (screen, _) = screen_with_patch(0, 0);
        let part = crop(&screen, &SearchRegion::new(50, 30, 100, 100));
        assert_eq!((part.width(), part.height()), (10, 10));
    }

    #[test]
    fn missing_template_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = TemplateMatcher::new(dir.path());
        let screen = GrayImage::new(10, 10);

        let err = matcher.find(&screen, "nope.png", None, 0.8).unwrap_err();
        assert!(matches!(err, AutomationError::TemplateLoad { .. }));
    }

    #[test]
    fn cached_template_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let (screen, template) = screen_with_patch(20, 10);
        template.save(dir.path().join("patch.png")).unwrap();
        let matcher = TemplateMatcher::new(dir.path());

        let hit = matcher.find(&screen, "patch.png", None, 0.9).unwrap().unwrap();
        std::fs::remove_file(dir.path().join("patch.png")).unwrap();
        let again = matcher.find(&screen, "patch.png", None, 0.9).unwrap().unwrap();

        assert_eq!(hit.center, again.center);
    }
}
