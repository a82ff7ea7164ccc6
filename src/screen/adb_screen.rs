//! Production screen: captures and input over ADB, matching with imageproc,
//! text through tesseract.

use super::matcher::{self, TemplateMatcher};
use super::ocr::TesseractOcr;
use super::{GameScreen, Point, SearchRegion};
use crate::adb::{AdbDevice, AdbResult};
use crate::config::{DeviceConfig, OcrConfig};
use crate::error::AutomationError;
use image::GrayImage;
use std::time::Duration;

pub struct AdbScreen {
    device: AdbDevice,
    matcher: TemplateMatcher,
    ocr: TesseractOcr,
}

impl AdbScreen {
    pub async fn connect(device: &DeviceConfig, ocr: &OcrConfig) -> AdbResult<Self> {
        let adb = AdbDevice::connect(
            device.serial.as_deref(),
            Duration::from_secs(device.command_timeout_secs),
        )
        .await?;
        Ok(Self::new(adb, ocr))
    }

    pub fn new(device: AdbDevice, ocr: &OcrConfig) -> Self {
        Self {
            device,
            matcher: TemplateMatcher::new(&ocr.templates_dir),
            ocr: TesseractOcr::new(
                ocr.tesseract_bin.clone(),
                ocr.page_seg_mode,
                Duration::from_secs(ocr.timeout_secs),
            ),
        }
    }

    async fn capture_gray(&self) -> Result<GrayImage, AutomationError> {
        let png = self.device.screencap_png().await?;
        Ok(image::load_from_memory(&png)?.to_luma8())
    }
}

/// Android key code for a friendly key name; unknown names are passed
/// through as `KEYCODE_<NAME>`.
pub fn keycode_for(key: &str) -> String {
    let code = match key.to_ascii_lowercase().as_str() {
        "back" | "escape" | "esc" => "KEYCODE_BACK",
        "home" => "KEYCODE_HOME",
        "enter" | "return" => "KEYCODE_ENTER",
        "space" => "KEYCODE_SPACE",
        "menu" => "KEYCODE_MENU",
        "tab" => "KEYCODE_TAB",
        other if other.starts_with("keycode_") => return other.to_ascii_uppercase(),
        other if other.chars().all(|c| c.is_ascii_digit()) && !other.is_empty() => {
            return other.to_string();
        }
        other => return format!("KEYCODE_{}", other.to_ascii_uppercase()),
    };
    code.to_string()
}

impl GameScreen for AdbScreen {
    async fn find_image(
        &self,
        template: &str,
        region: Option<&SearchRegion>,
        threshold: f32,
    ) -> Result<Option<Point>, AutomationError> {
        let screen = self.capture_gray().await?;
        let hit = self.matcher.find(&screen, template, region, threshold)?;
        Ok(hit.map(|h| h.center))
    }

    async fn read_text_from_region(&self, region: &SearchRegion) -> Result<String, AutomationError> {
        let screen = self.capture_gray().await?;
        let area = matcher::crop(&screen, region);
        if area.width() == 0 || area.height() == 0 {
            return Ok(String::new());
        }
        self.ocr.read(&area).await
    }

    async fn click(&self, point: Point) -> Result<(), AutomationError> {
        log::debug!("👆 Tap {}", point);
        self.device.tap(point.x, point.y).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), AutomationError> {
        let code = keycode_for(key);
        log::debug!("⌨️ Key '{}' ({})", key, code);
        self.device.keyevent(&code).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_key_names_map_to_keycodes() {
        assert_eq!(keycode_for("back"), "KEYCODE_BACK");
        assert_eq!(keycode_for("Escape"), "KEYCODE_BACK");
        assert_eq!(keycode_for("space"), "KEYCODE_SPACE");
    }

    #[test]
    fn test_raw_codes_pass_through() {
        assert_eq!(keycode_for("keycode_camera"), "KEYCODE_CAMERA");
        assert_eq!(keycode_for("4"), "4");
        assert_eq!(keycode_for("f1"), "KEYCODE_F1");
    }
}
