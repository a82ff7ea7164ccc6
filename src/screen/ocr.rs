// Text extraction by piping a PNG crop through the tesseract CLI
use crate::error::AutomationError;
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    page_seg_mode: u8,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, page_seg_mode: u8, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            page_seg_mode,
            timeout,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            self.page_seg_mode.to_string(),
        ]
    }

    /// Recognised text with surrounding whitespace trimmed.
    pub async fn read(&self, image: &GrayImage) -> Result<String, AutomationError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AutomationError::Ocr(format!("could not start '{}': {e}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| AutomationError::Ocr(format!("writing image to tesseract: {e}")))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AutomationError::Ocr(format!("tesseract timed out after {:?}", self.timeout))
            })?
            .map_err(|e| AutomationError::Ocr(format!("tesseract failed: {e}")))?;

        if !output.status.success() {
            return Err(AutomationError::Ocr(format!(
                "tesseract exited with {}",
                output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        log::debug!("🔤 OCR read '{}'", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_page_segmentation_mode() {
        let ocr = TesseractOcr::new("tesseract", 7, Duration::from_secs(5));
        assert_eq!(ocr.args(), vec!["stdin", "stdout", "--psm", "7"]);
    }

    #[tokio::test]
    async fn missing_binary_is_an_ocr_error() {
        let ocr = TesseractOcr::new("definitely-not-tesseract-bin", 7, Duration::from_secs(5));
        let err = ocr.read(&GrayImage::new(4, 4)).await.unwrap_err();
        assert!(matches!(err, AutomationError::Ocr(_)));
    }
}
