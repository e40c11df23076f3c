mod preprocess;
mod tesseract;
mod ultraface;

pub use preprocess::Preprocessor;
pub use tesseract::TesseractTextDetector;
pub use ultraface::UltraFaceDetector;

use crate::capture::{Frame, StillImage};
use crate::geometry::{Point, Rect};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One face found in an analysis frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    /// Bounding box in frame pixel coordinates
    pub bounding_box: Rect,
    /// Contour points in drawing order
    pub contour_points: Vec<Point>,
}

/// A block of recognized text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
}

/// Output of a text detector: blocks in reading order, each with ordered lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextResult {
    pub blocks: Vec<TextBlock>,
}

impl TextResult {
    /// A result holding a single block with the given lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocks: vec![TextBlock {
                lines: lines.into_iter().map(Into::into).collect(),
            }],
        }
    }

    /// Split plain recognizer output into blocks at blank lines.
    pub fn from_plain_text(text: &str) -> Self {
        let mut blocks = Vec::new();
        let mut current = TextBlock::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() {
                if !current.lines.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
            } else {
                current.lines.push(line.to_string());
            }
        }
        if !current.lines.is_empty() {
            blocks.push(current);
        }
        Self { blocks }
    }

    /// Every line of every block, in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.blocks
            .iter()
            .flat_map(|block| block.lines.iter().map(String::as_str))
    }
}

/// Face geometry detector run on analysis frames.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceDetection>>;
}

/// Text recognizer run on still captures.
#[async_trait]
pub trait TextDetector: Send + Sync {
    async fn detect(&self, image: &StillImage) -> Result<TextResult>;
}

/// Create the default face detector (UltraFace)
pub fn create_default_face_detector(model_path: &str) -> Result<Arc<dyn FaceDetector>> {
    let detector = UltraFaceDetector::new(model_path)?;
    Ok(Arc::new(detector))
}
