use crate::capture::CameraProvider;
use crate::config::ScanConfig;
use crate::detection::{FaceDetector, TextDetector};
use crate::error::Result;
use crate::overlay::OverlaySurface;
use crate::persist::{ImageStore, ResultDelivery};
use crate::scan::{FaceScanSession, TextScanSession};
use std::sync::Arc;

/// Entry point that hands out scan sessions.
///
/// Construct one per application and pass it to whoever needs it; everything
/// it creates shares its configuration and scan directory.
#[derive(Clone)]
pub struct ScanSdk {
    config: Arc<ScanConfig>,
    store: ImageStore,
}

impl ScanSdk {
    /// Fails with [`crate::ScanError::UninitializedDependency`] when no cache
    /// directory is configured.
    pub fn new(config: ScanConfig) -> Result<Self> {
        let store = ImageStore::new(&config.storage)?;
        tracing::info!("Scan SDK initialized, captures go to {}", store.dir().display());
        Ok(Self {
            config: Arc::new(config),
            store,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn face_session(
        &self,
        provider: Arc<dyn CameraProvider>,
        detector: Arc<dyn FaceDetector>,
        surface: Arc<dyn OverlaySurface>,
    ) -> Result<FaceScanSession> {
        FaceScanSession::new(provider, detector, surface, &self.config, self.store.clone())
    }

    pub fn text_session(
        &self,
        provider: Arc<dyn CameraProvider>,
        detector: Arc<dyn TextDetector>,
    ) -> Result<TextScanSession> {
        TextScanSession::new(provider, detector, &self.config)
    }

    pub fn image_store(&self) -> &ImageStore {
        &self.store
    }

    pub fn result_delivery(&self) -> ResultDelivery {
        ResultDelivery::from_config(&self.config.delivery)
    }

    /// Delete temporarily stored captures.
    pub fn clear_cached_data(&self) -> Result<()> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;

    #[test]
    fn construction_requires_a_cache_dir() {
        let result = ScanSdk::new(ScanConfig::default());
        assert!(matches!(
            result,
            Err(ScanError::UninitializedDependency("cache directory"))
        ));
    }

    #[test]
    fn clear_cached_data_removes_stored_scans() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = ScanSdk::new(ScanConfig::with_cache_dir(dir.path())).unwrap();
        std::fs::create_dir_all(sdk.image_store().dir()).unwrap();
        std::fs::write(sdk.image_store().dir().join("1.png"), b"x").unwrap();

        sdk.clear_cached_data().unwrap();
        assert!(!sdk.image_store().dir().exists());
    }
}
