use super::Resolver;
use crate::analysis::{FaceAnalyzer, FrameAnalyzer};
use crate::capture::{CameraProvider, LensFacing};
use crate::config::{FaceCaptureConfig, ScanConfig};
use crate::detection::FaceDetector;
use crate::error::{Result, ScanError};
use crate::imaging;
use crate::overlay::{Overlay, OverlaySurface};
use crate::persist::{ImageStore, ResultDelivery, SaveOutcome};
use crate::session::{SessionController, SessionVariant};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;

struct FaceVariant {
    analyzer: Arc<FaceAnalyzer>,
}

impl SessionVariant for FaceVariant {
    fn name(&self) -> &'static str {
        "face"
    }

    fn lens(&self) -> LensFacing {
        LensFacing::Front
    }

    fn analyzer(&self) -> Option<Arc<dyn FrameAnalyzer>> {
        Some(self.analyzer.clone() as Arc<dyn FrameAnalyzer>)
    }
}

/// Front-camera session with live positioning feedback and single-shot capture.
#[derive(Clone)]
pub struct FaceScanSession {
    controller: SessionController,
    analyzer: Arc<FaceAnalyzer>,
    capture: FaceCaptureConfig,
    store: ImageStore,
    delivery: ResultDelivery,
}

impl FaceScanSession {
    pub(crate) fn new(
        provider: Arc<dyn CameraProvider>,
        detector: Arc<dyn FaceDetector>,
        surface: Arc<dyn OverlaySurface>,
        config: &ScanConfig,
        store: ImageStore,
    ) -> Result<Self> {
        let overlay = Arc::new(Overlay::new(surface));
        let analyzer = Arc::new(FaceAnalyzer::new(detector, overlay, config.target.clone()));
        let controller = SessionController::new(
            provider,
            Arc::new(FaceVariant {
                analyzer: analyzer.clone(),
            }),
            config.session.clone(),
        )?;

        Ok(Self {
            controller,
            analyzer,
            capture: config.face.clone(),
            store,
            delivery: ResultDelivery::from_config(&config.delivery),
        })
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn start_session(&self) {
        self.controller.start();
    }

    pub fn stop_session(&self) {
        self.controller.stop();
    }

    pub fn set_error_callback(&self, callback: impl Fn(&ScanError) + Send + Sync + 'static) {
        self.controller.set_error_callback(callback);
    }

    /// Called with the latest analysed frame's positioning, while active.
    pub fn set_position_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.analyzer.set_position_listener(Arc::new(listener));
    }

    pub fn overlay(&self) -> &Arc<Overlay> {
        self.analyzer.overlay()
    }

    /// Capture a still and turn it into the processed image.
    ///
    /// No detection runs here; positioning was already judged on the live frames.
    pub async fn capture_image(&self) -> Result<DynamicImage> {
        let still = self.controller.capture_still().await?;
        let image = imaging::decode_still(&still.bytes).map_err(|err| {
            tracing::debug!("Failed to decode still capture: {}", err);
            ScanError::capture("Scan failed")
        })?;

        if self.capture.mirror_and_rotate {
            Ok(imaging::mirror_and_rotate(&image))
        } else {
            Ok(image)
        }
    }

    /// Callback form of [`Self::capture_image`]; exactly one callback fires.
    pub fn capture(
        &self,
        on_success: impl FnOnce(DynamicImage) + Send + 'static,
        on_error: impl FnOnce(String) + Send + 'static,
    ) {
        let resolver = Resolver::new(on_success, on_error);
        let session = self.clone();
        self.controller.spawn(async move {
            resolver.resolve(session.capture_image().await);
        });
    }

    /// Capture, persist, and hand back the saved file after the delivery delay.
    pub async fn capture_to_file(&self) -> Result<PathBuf> {
        let image = self.capture_image().await?;
        let outcomes = self.store.save(Some(image));
        self.delivery
            .deliver(outcomes)
            .await
            .unwrap_or_else(|| SaveOutcome::Error(ScanError::Cancelled))
            .into_result()
    }

    /// Callback form of [`Self::capture_to_file`].
    pub fn capture_and_save(
        &self,
        on_success: impl FnOnce(PathBuf) + Send + 'static,
        on_error: impl FnOnce(String) + Send + 'static,
    ) {
        let resolver = Resolver::new(on_success, on_error);
        let session = self.clone();
        self.controller.spawn(async move {
            resolver.resolve(session.capture_to_file().await);
        });
    }
}
