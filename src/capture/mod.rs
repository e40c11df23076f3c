mod bridge;
mod frame;
mod webcam;

pub(crate) use bridge::{provider_ready, take_still};
pub use frame::{latest_frame_channel, Frame, FrameReceiver, FrameSink, StillImage};
pub use webcam::WebcamProvider;

use crate::error::{Result, ScanError};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensFacing {
    Front,
    Back,
}

/// Receives unrecoverable errors raised by a bound source.
#[derive(Clone)]
pub struct SourceErrorSink {
    report: Arc<dyn Fn(ScanError) + Send + Sync>,
}

impl SourceErrorSink {
    pub fn new(report: impl Fn(ScanError) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    pub fn report(&self, err: ScanError) {
        (self.report)(err)
    }
}

impl fmt::Debug for SourceErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SourceErrorSink")
    }
}

/// The set of use cases bound to a source in a single exclusive bind.
#[derive(Debug, Clone)]
pub struct UseCases {
    pub lens: LensFacing,
    pub preview: bool,
    pub still_capture: bool,
    /// Analysis stream destination; `None` when the session does not analyse frames.
    pub analysis: Option<FrameSink>,
    pub errors: SourceErrorSink,
}

pub type ReadyCallback = Box<dyn FnOnce(Result<Arc<dyn FrameSource>>) + Send>;
pub type StillCallback = Box<dyn FnOnce(Result<StillImage>) + Send>;

/// Asynchronously initialised camera backend.
pub trait CameraProvider: Send + Sync {
    /// Invoke `on_ready` once the backend can hand out a source.
    fn when_ready(&self, on_ready: ReadyCallback);
}

/// A camera that can be bound to a set of use cases.
pub trait FrameSource: Send + Sync {
    /// Number of camera devices the backend can see.
    fn available_devices(&self) -> usize;

    /// Bind the given use cases, replacing any previous binding.
    fn bind(&self, use_cases: UseCases) -> Result<()>;

    /// Unbind every use case. Safe to call when nothing is bound.
    fn unbind(&self);

    /// Request one still image; `on_captured` is invoked exactly once.
    fn take_picture(&self, on_captured: StillCallback);
}
