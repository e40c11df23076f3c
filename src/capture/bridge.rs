//! Turns the callback-style camera notifications into single-shot futures.
//!
//! Each bridge owns the receiving half of a oneshot channel; if the future is
//! dropped (session torn down, task aborted) a late callback finds the channel
//! closed and becomes a no-op.

use super::{CameraProvider, FrameSource, StillImage};
use crate::error::{Result, ScanError};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Resolves once the provider reports it is ready.
pub(crate) async fn provider_ready(provider: &dyn CameraProvider) -> Result<Arc<dyn FrameSource>> {
    let (tx, rx) = oneshot::channel();
    provider.when_ready(Box::new(move |source| {
        if tx.send(source).is_err() {
            tracing::debug!("Camera provider became ready after the wait was abandoned");
        }
    }));
    rx.await.unwrap_or(Err(ScanError::NoDeviceAvailable))
}

/// Resolves with the still image produced by a single capture request.
pub(crate) async fn take_still(source: &dyn FrameSource) -> Result<StillImage> {
    let (tx, rx) = oneshot::channel();
    {
        let _span = tracing::debug_span!("take_still").entered();
        source.take_picture(Box::new(move |still| {
            let _ = tx.send(still);
        }));
    }
    rx.await
        .unwrap_or_else(|_| Err(ScanError::capture("Capture callback was dropped")))
}
