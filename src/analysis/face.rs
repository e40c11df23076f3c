use super::FrameAnalyzer;
use crate::capture::Frame;
use crate::config::TargetRegionConfig;
use crate::detection::FaceDetector;
use crate::geometry::TargetRegion;
use crate::overlay::{Annotation, Overlay, PositionMessage};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Receives whether the detected face sits inside the target oval.
pub type PositionListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Runs face detection on each analysis frame and keeps the overlay and the
/// position listener up to date.
pub struct FaceAnalyzer {
    detector: Arc<dyn FaceDetector>,
    overlay: Arc<Overlay>,
    target: TargetRegionConfig,
    listener: RwLock<Option<PositionListener>>,
}

impl FaceAnalyzer {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        overlay: Arc<Overlay>,
        target: TargetRegionConfig,
    ) -> Self {
        Self {
            detector,
            overlay,
            target,
            listener: RwLock::new(None),
        }
    }

    pub fn set_position_listener(&self, listener: PositionListener) {
        *self
            .listener
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(listener);
    }

    pub fn overlay(&self) -> &Arc<Overlay> {
        &self.overlay
    }

    fn listener(&self) -> Option<PositionListener> {
        self.listener
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl FrameAnalyzer for FaceAnalyzer {
    fn attach(&self) {
        self.overlay.attach();
    }

    fn detach(&self) {
        self.overlay.detach();
    }

    async fn analyze(&self, frame: Frame, cancel: &CancellationToken) {
        let detection = self
            .detector
            .detect(&frame)
            .instrument(tracing::debug_span!("detect_faces", seq = frame.seq()));

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = detection => Some(result),
        };

        let faces = match result {
            Some(Ok(faces)) if !cancel.is_cancelled() => faces,
            Some(Err(err)) => {
                tracing::debug!("Face detection failed for frame {}: {:#}", frame.seq(), err);
                frame.release();
                return;
            }
            _ => {
                tracing::debug!("Session stopped, dropping result for frame {}", frame.seq());
                frame.release();
                return;
            }
        };

        let (width, height) = frame.dimensions();
        let seq = frame.seq();
        frame.release();

        let target = TargetRegion::for_frame(width, height, &self.target);
        let listener = self.listener();
        let annotations: Vec<Annotation> = faces
            .into_iter()
            .map(|face| {
                let correct = target.is_position_correct(&face.bounding_box);
                if let Some(listener) = &listener {
                    listener(correct);
                }
                Annotation {
                    contour: face.contour_points,
                    bounding_box: face.bounding_box,
                    target: target.bounds,
                    message: PositionMessage::from_position(correct),
                }
            })
            .collect();

        if !self.overlay.publish(seq, annotations) {
            tracing::debug!("Overlay rejected stale frame {}", seq);
        }
    }
}
