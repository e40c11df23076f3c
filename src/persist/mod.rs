//! Persistence of processed face captures.
//!
//! A save request yields a stream with exactly one terminal [`SaveOutcome`].
//! The encoded file is fully written before `FilePath` is emitted.

use crate::config::{DeliveryConfig, StorageConfig};
use crate::error::{Result, ScanError};
use crate::imaging;
use futures::{Stream, StreamExt};
use image::DynamicImage;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Extension given to persisted captures. The bytes are JPEG-encoded.
pub const IMAGE_EXTENSION: &str = "png";

#[derive(Debug, Clone)]
pub enum SaveOutcome {
    FilePath(PathBuf),
    Error(ScanError),
}

impl SaveOutcome {
    pub fn into_result(self) -> Result<PathBuf> {
        match self {
            Self::FilePath(path) => Ok(path),
            Self::Error(err) => Err(err),
        }
    }
}

/// Where encoded bytes end up.
pub trait PersistenceBackend: Send + Sync {
    fn write(&self, bytes: &[u8], path: &Path) -> io::Result<()>;
}

/// Writes straight to the local filesystem.
pub struct FsBackend;

impl PersistenceBackend for FsBackend {
    fn write(&self, bytes: &[u8], path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

#[derive(Clone)]
pub struct ImageStore {
    dir: PathBuf,
    quality: u8,
    backend: Arc<dyn PersistenceBackend>,
}

impl ImageStore {
    pub fn new(storage: &StorageConfig) -> Result<Self> {
        Ok(Self {
            dir: storage.scan_dir()?,
            quality: storage.quality(),
            backend: Arc::new(FsBackend),
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn PersistenceBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `image`; the stream yields one outcome and ends.
    pub fn save(&self, image: Option<DynamicImage>) -> impl Stream<Item = SaveOutcome> + Send + 'static {
        let store = self.clone();
        futures::stream::once(async move { store.save_image(image).await })
    }

    pub async fn save_image(&self, image: Option<DynamicImage>) -> SaveOutcome {
        let Some(image) = image else {
            tracing::error!("Scanned image is null");
            return SaveOutcome::Error(ScanError::IllegalState(
                "Scanned image is null".to_string(),
            ));
        };

        let path = match self.reserve_destination() {
            Ok(path) => path,
            Err(err) => {
                tracing::error!("Failed to prepare {}: {}", self.dir.display(), err);
                return SaveOutcome::Error(err.into());
            }
        };

        let backend = self.backend.clone();
        let quality = self.quality;
        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || -> io::Result<()> {
            let bytes = imaging::encode_jpeg(&image.to_rgb8(), quality).map_err(io::Error::other)?;
            backend.write(&bytes, &target)
        })
        .await
        .unwrap_or_else(|err| Err(io::Error::other(err)));

        match written {
            Ok(()) => {
                tracing::info!("Saved scanned image to {}", path.display());
                SaveOutcome::FilePath(path)
            }
            Err(err) => {
                tracing::error!("Save bitmap to file an IO exception: {}", err);
                let _ = fs::remove_file(&path);
                SaveOutcome::Error(err.into())
            }
        }
    }

    /// Create the scan directory and claim a `<millis>.png` name in it.
    fn reserve_destination(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let mut millis = chrono::Utc::now().timestamp_millis();
        loop {
            let path = self.dir.join(format!("{}.{}", millis, IMAGE_EXTENSION));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => millis += 1,
                Err(err) => return Err(err),
            }
        }
    }

    /// Remove every persisted capture. A missing directory is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::info!("Cleared cached scans in {}", self.dir.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                tracing::error!("Clear cached data exception: {}", err);
                Err(err.into())
            }
        }
    }
}

/// Consumer side of a save: waits for the terminal outcome, then holds it for
/// a fixed delay before handing it on.
#[derive(Debug, Clone)]
pub struct ResultDelivery {
    delay: Duration,
}

impl ResultDelivery {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.result_delay())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// `None` if the stream ended without an outcome.
    pub async fn deliver<S>(&self, outcomes: S) -> Option<SaveOutcome>
    where
        S: Stream<Item = SaveOutcome>,
    {
        let mut outcomes = std::pin::pin!(outcomes);
        let outcome = outcomes.next().await?;
        tokio::time::sleep(self.delay).await;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    struct FailingBackend;

    impl PersistenceBackend for FailingBackend {
        fn write(&self, _bytes: &[u8], _path: &Path) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    fn store_in(dir: &Path) -> ImageStore {
        ImageStore::new(&StorageConfig::new(dir)).unwrap()
    }

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])))
    }

    #[tokio::test]
    async fn absent_image_emits_a_single_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes: Vec<_> = store_in(dir.path()).save(None).collect().await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            SaveOutcome::Error(ScanError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn saved_file_is_complete_when_the_path_is_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let outcomes: Vec<_> = store.save(Some(sample_image())).collect().await;

        assert_eq!(outcomes.len(), 1);
        let SaveOutcome::FilePath(path) = &outcomes[0] else {
            panic!("expected a file path, got {:?}", outcomes[0]);
        };
        assert_eq!(path.parent(), Some(store.dir()));
        assert!(store.dir().ends_with("ScannedFaceImage"));

        let name = path.file_name().unwrap().to_str().unwrap();
        let stem = name.strip_suffix(".png").unwrap();
        assert!(!stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()));

        // JPEG bytes behind the .png name
        let bytes = fs::read(path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn names_are_unique_within_the_same_millisecond() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let first = store.save_image(Some(sample_image())).await.into_result().unwrap();
        let second = store.save_image(Some(sample_image())).await.into_result().unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn write_failures_surface_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).with_backend(Arc::new(FailingBackend));
        let outcome = store.save_image(Some(sample_image())).await;

        assert!(matches!(
            outcome,
            SaveOutcome::Error(ScanError::PersistenceIOFailure(_))
        ));
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unwritable_cache_dir_fails_while_preparing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();

        let outcome = store_in(&blocker).save_image(Some(sample_image())).await;
        assert!(matches!(outcome, SaveOutcome::Error(_)));
    }

    #[tokio::test]
    async fn clear_removes_the_scan_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save_image(Some(sample_image())).await.into_result().unwrap();

        store.clear().unwrap();
        assert!(!store.dir().exists());
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_waits_the_configured_delay() {
        let delivery = ResultDelivery::from_config(&DeliveryConfig::default());
        let started = tokio::time::Instant::now();
        let outcome = delivery
            .deliver(futures::stream::once(async {
                SaveOutcome::FilePath(PathBuf::from("/tmp/1.png"))
            }))
            .await;

        assert!(matches!(outcome, Some(SaveOutcome::FilePath(_))));
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
