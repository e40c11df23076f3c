use image::RgbImage;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// One unit of the analysis stream.
///
/// A frame carries a release obligation towards its source. The hook runs when
/// the frame is released explicitly or dropped, so superseded frames are
/// returned to the source too.
pub struct Frame {
    seq: u64,
    image: RgbImage,
    rotation_degrees: u32,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            seq: 0,
            image,
            rotation_degrees: 0,
            release: None,
        }
    }

    pub fn with_rotation(mut self, rotation_degrees: u32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    pub fn on_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// Sequence number assigned by the sink; later frames have larger numbers.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn rotation_degrees(&self) -> u32 {
        self.rotation_degrees
    }

    /// Hand the frame's buffer back to the source.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("dimensions", &self.image.dimensions())
            .field("rotation_degrees", &self.rotation_degrees)
            .finish()
    }
}

/// Encoded still image returned by a capture request.
#[derive(Debug, Clone)]
pub struct StillImage {
    pub bytes: Vec<u8>,
    pub rotation_degrees: u32,
}

impl StillImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            rotation_degrees: 0,
        }
    }
}

#[derive(Default)]
struct SlotState {
    frame: Option<Frame>,
    next_seq: u64,
    dropped: u64,
    closed: bool,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl Slot {
    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Producer half of the keep-only-latest analysis channel.
#[derive(Clone)]
pub struct FrameSink {
    slot: Arc<Slot>,
}

/// Consumer half of the keep-only-latest analysis channel.
pub struct FrameReceiver {
    slot: Arc<Slot>,
}

/// A single-slot channel: a frame offered while another is still pending
/// replaces it, and the replaced frame is released.
pub fn latest_frame_channel() -> (FrameSink, FrameReceiver) {
    let slot = Arc::new(Slot::default());
    (
        FrameSink { slot: slot.clone() },
        FrameReceiver { slot },
    )
}

impl FrameSink {
    /// Offer a frame. Returns `false` (and releases the frame) once closed.
    pub fn offer(&self, mut frame: Frame) -> bool {
        let mut state = self.slot.lock();
        if state.closed {
            drop(state);
            frame.release();
            return false;
        }
        state.next_seq += 1;
        frame.seq = state.next_seq;
        let superseded = state.frame.replace(frame);
        if superseded.is_some() {
            state.dropped += 1;
        }
        drop(state);
        self.slot.notify.notify_one();
        drop(superseded);
        true
    }

    pub fn close(&self) {
        let pending = {
            let mut state = self.slot.lock();
            state.closed = true;
            state.frame.take()
        };
        self.slot.notify.notify_one();
        drop(pending);
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }
}

impl fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl FrameReceiver {
    /// Wait for the most recent frame. `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            {
                let mut state = self.slot.lock();
                if let Some(frame) = state.frame.take() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            self.slot.notify.notified().await;
        }
    }

    /// Frames replaced before they were consumed.
    pub fn dropped(&self) -> u64 {
        self.slot.lock().dropped
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        let pending = {
            let mut state = self.slot.lock();
            state.closed = true;
            state.frame.take()
        };
        drop(pending);
    }
}
