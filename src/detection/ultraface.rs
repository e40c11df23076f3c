use super::preprocess::Preprocessor;
use super::{FaceDetection, FaceDetector};
use crate::capture::Frame;
use crate::geometry::Rect;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use ndarray::Ix3;
use ort::{GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// UltraFace (RFB-320) face detector
///
/// The model takes a 320x240 frame and returns, per anchor, a
/// `[background, face]` score pair and a box normalized to `[0, 1]`.
/// It gives no landmarks, so the contour is the box outline.
pub struct UltraFaceDetector {
    session: Arc<Mutex<Session>>,
    preprocessor: Arc<Preprocessor>,
    score_threshold: f32,
    iou_threshold: f32,
}

impl UltraFaceDetector {
    /// Create a detector from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 320x240
    /// - Score threshold: 0.7
    /// - IoU threshold for suppression: 0.3
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading UltraFace model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("UltraFace model loaded successfully");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            preprocessor: Arc::new(Preprocessor::new(320, 240, 127.0, 1.0 / 128.0)),
            score_threshold: 0.7,
            iou_threshold: 0.3,
        })
    }

    pub fn with_thresholds(mut self, score_threshold: f32, iou_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self.iou_threshold = iou_threshold;
        self
    }

    fn infer(
        session: &mut Session,
        preprocessor: &Preprocessor,
        image: &RgbImage,
    ) -> Result<Vec<(f32, Rect)>> {
        let _span = tracing::debug_span!("ultraface_infer").entered();

        let input_tensor = preprocessor.preprocess(image)?;
        let outputs = session
            .run(ort::inputs![input_tensor.view()]?)
            .context("Failed to run inference")?;

        // scores: [1, N, 2], boxes: [1, N, 4]
        let scores = outputs[0]
            .try_extract_tensor::<f32>()?
            .view()
            .to_owned()
            .into_dimensionality::<Ix3>()?;
        let boxes = outputs[1]
            .try_extract_tensor::<f32>()?
            .view()
            .to_owned()
            .into_dimensionality::<Ix3>()?;

        let (width, height) = image.dimensions();
        let (width, height) = (width as f32, height as f32);
        let anchors = scores.shape()[1].min(boxes.shape()[1]);

        let candidates = (0..anchors)
            .map(|i| {
                let rect = Rect::new(
                    boxes[[0, i, 0]].clamp(0.0, 1.0) * width,
                    boxes[[0, i, 1]].clamp(0.0, 1.0) * height,
                    boxes[[0, i, 2]].clamp(0.0, 1.0) * width,
                    boxes[[0, i, 3]].clamp(0.0, 1.0) * height,
                );
                (scores[[0, i, 1]], rect)
            })
            .collect();

        Ok(candidates)
    }
}

/// Greedy non-maximum suppression, highest score first.
fn suppress(mut candidates: Vec<(f32, Rect)>, score_threshold: f32, iou_threshold: f32) -> Vec<Rect> {
    candidates.retain(|(score, rect)| *score >= score_threshold && rect.area() > 0.0);
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut kept: Vec<Rect> = Vec::new();
    for (_, rect) in candidates {
        if kept
            .iter()
            .all(|other| other.intersection_over_union(&rect) <= iou_threshold)
        {
            kept.push(rect);
        }
    }
    kept
}

#[async_trait]
impl FaceDetector for UltraFaceDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceDetection>> {
        let session = self.session.clone();
        let preprocessor = self.preprocessor.clone();
        let image = frame.image().clone();
        let (score_threshold, iou_threshold) = (self.score_threshold, self.iou_threshold);

        let boxes = tokio::task::spawn_blocking(move || -> Result<Vec<Rect>> {
            let mut session = session
                .lock()
                .map_err(|_| anyhow!("UltraFace session lock poisoned"))?;
            let candidates = Self::infer(&mut session, &preprocessor, &image)?;
            Ok(suppress(candidates, score_threshold, iou_threshold))
        })
        .await
        .context("UltraFace worker failed")??;

        tracing::debug!("UltraFace found {} face(s)", boxes.len());

        Ok(boxes
            .into_iter()
            .map(|bounding_box| FaceDetection {
                contour_points: bounding_box.corners().to_vec(),
                bounding_box,
            })
            .collect())
    }
}
