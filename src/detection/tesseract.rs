use super::{TextDetector, TextResult};
use crate::capture::StillImage;
use crate::imaging;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusty_tesseract::{Args, Image};
use std::collections::HashMap;

/// Text recognizer backed by the system `tesseract` binary.
pub struct TesseractTextDetector {
    args: Args,
}

impl TesseractTextDetector {
    pub fn new(lang: &str) -> Self {
        Self {
            args: Args {
                lang: lang.to_string(),
                config_variables: HashMap::new(),
                dpi: Some(300),
                psm: Some(3), // Fully automatic page segmentation, no OSD
                oem: Some(3), // Default OCR Engine Mode
            },
        }
    }
}

impl Default for TesseractTextDetector {
    fn default() -> Self {
        Self::new("eng")
    }
}

#[async_trait]
impl TextDetector for TesseractTextDetector {
    async fn detect(&self, image: &StillImage) -> Result<TextResult> {
        let bytes = image.bytes.clone();
        let args = self.args.clone();

        tokio::task::spawn_blocking(move || -> Result<TextResult> {
            let _span = tracing::debug_span!("tesseract").entered();
            let decoded = imaging::decode_still(&bytes).context("Failed to decode still image")?;

            tracing::info!(
                "Running tesseract on {}x{} image...",
                decoded.width(),
                decoded.height()
            );

            let tess_img = Image::from_dynamic_image(&decoded)
                .context("Failed to create tesseract image")?;
            let text = rusty_tesseract::image_to_string(&tess_img, &args)
                .context("Tesseract failed")?;
            Ok(TextResult::from_plain_text(&text))
        })
        .await
        .context("Tesseract worker failed")?
    }
}
