use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Failures surfaced by scan sessions, capture operations and persistence.
///
/// The `Display` output is the message handed to `on_error` callbacks, so
/// variants that wrap a cause print the cause alone.
#[derive(Error, Debug, Clone)]
pub enum ScanError {
    #[error("No cameras found")]
    NoDeviceAvailable,
    #[error("Failed to bind camera use cases: {0}")]
    SourceBindingFailed(String),
    #[error("{0}")]
    StillCaptureFailed(String),
    #[error("{0}")]
    DetectionFailed(String),
    #[error("No texts recognized")]
    EmptyRecognitionResult,
    #[error("Failed to persist scanned image: {0}")]
    PersistenceIOFailure(Arc<std::io::Error>),
    #[error("{0} is not initialized!")]
    UninitializedDependency(&'static str),
    #[error("Camera source failed: {0}")]
    SourceFailed(String),
    #[error("Scan session is not active")]
    SessionInactive,
    #[error("Scan session stopped before the operation completed")]
    Cancelled,
    #[error("{0}")]
    IllegalState(String),
}

impl ScanError {
    pub fn capture(cause: impl std::fmt::Display) -> Self {
        Self::StillCaptureFailed(cause.to_string())
    }

    pub fn detection(cause: impl std::fmt::Display) -> Self {
        Self::DetectionFailed(cause.to_string())
    }

    /// The human-readable message delivered at the operation boundary.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceIOFailure(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_messages_carry_the_bare_cause() {
        assert_eq!(ScanError::capture("sensor busy").message(), "sensor busy");
        assert_eq!(ScanError::detection("model crashed").message(), "model crashed");
        assert_eq!(
            ScanError::EmptyRecognitionResult.message(),
            "No texts recognized"
        );
        assert_eq!(
            ScanError::UninitializedDependency("cache directory").message(),
            "cache directory is not initialized!"
        );
    }

    #[test]
    fn io_errors_map_to_persistence_failures() {
        let err: ScanError = std::io::Error::other("disk full").into();
        assert!(matches!(err, ScanError::PersistenceIOFailure(_)));
        assert!(err.message().contains("disk full"));
    }
}
