// Screen that only logs what it would do; nothing is ever found or read
use super::{GameScreen, Point, SearchRegion};
use crate::error::AutomationError;

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunScreen;

impl GameScreen for DryRunScreen {
    async fn find_image(
        &self,
        template: &str,
        region: Option<&SearchRegion>,
        threshold: f32,
    ) -> Result<Option<Point>, AutomationError> {
        log::info!(
            "🧪 [dry-run] find '{}' in {} (threshold {:.2})",
            template,
            region.map(SearchRegion::label).unwrap_or_else(|| "screen".into()),
            threshold
        );
        Ok(None)
    }

    async fn read_text_from_region(&self, region: &SearchRegion) -> Result<String, AutomationError> {
        log::info!("🧪 [dry-run] read text in {}", region.label());
        Ok(String::new())
    }

    async fn click(&self, point: Point) -> Result<(), AutomationError> {
        log::info!("🧪 [dry-run] tap {}", point);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), AutomationError> {
        log::info!("🧪 [dry-run] key '{}'", key);
        Ok(())
    }
}
