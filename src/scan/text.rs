use super::Resolver;
use crate::capture::{CameraProvider, LensFacing};
use crate::config::ScanConfig;
use crate::detection::TextDetector;
use crate::error::{Result, ScanError};
use crate::session::{SessionController, SessionVariant};
use std::sync::Arc;

struct TextVariant;

impl SessionVariant for TextVariant {
    fn name(&self) -> &'static str {
        "text"
    }

    fn lens(&self) -> LensFacing {
        LensFacing::Back
    }
}

/// Back-camera session that recognizes text in a single still.
#[derive(Clone)]
pub struct TextScanSession {
    controller: SessionController,
    detector: Arc<dyn TextDetector>,
}

impl TextScanSession {
    pub(crate) fn new(
        provider: Arc<dyn CameraProvider>,
        detector: Arc<dyn TextDetector>,
        config: &ScanConfig,
    ) -> Result<Self> {
        let controller =
            SessionController::new(provider, Arc::new(TextVariant), config.session.clone())?;
        Ok(Self {
            controller,
            detector,
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

    /// Capture a still and return every recognized line joined with `\n`.
    pub async fn capture_text(&self) -> Result<String> {
        let still = self.controller.capture_still().await?;
        let recognized = self.detector.detect(&still).await.map_err(|err| {
            tracing::debug!("Text recognition failed: {:#}", err);
            ScanError::detection(err)
        })?;

        let text = recognized.lines().collect::<Vec<_>>().join("\n");
        if text.is_empty() {
            Err(ScanError::EmptyRecognitionResult)
        } else {
            tracing::debug!("Recognized {} line(s)", recognized.lines().count());
            Ok(text)
        }
    }

    /// Callback form of [`Self::capture_text`]; exactly one callback fires.
    pub fn capture(
        &self,
        on_success: impl FnOnce(String) + Send + 'static,
        on_error: impl FnOnce(String) + Send + 'static,
    ) {
        let resolver = Resolver::new(on_success, on_error);
        let session = self.clone();
        self.controller.spawn(async move {
            resolver.resolve(session.capture_text().await);
        });
    }
}
