//! Content model of the live positioning overlay.
//!
//! The analysis loop is the only writer. Every analysed frame replaces the
//! whole annotation list in one step, and the draw side reads an immutable
//! snapshot, so a redraw never sees a half-populated list.

use crate::geometry::{Point, Rect};
use image::Rgb;
use std::sync::{Arc, Mutex, MutexGuard};

/// The drawing side of the overlay, e.g. a view that repaints on request.
pub trait OverlaySurface: Send + Sync {
    /// Schedule a repaint; the surface reads [`Overlay::annotations`] when it draws.
    fn request_redraw(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionMessage {
    Correct,
    Reposition,
}

impl PositionMessage {
    pub fn from_position(correct: bool) -> Self {
        if correct {
            Self::Correct
        } else {
            Self::Reposition
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::Correct => "The face position is correct",
            Self::Reposition => "Please position your face in the oval",
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        match self {
            Self::Correct => Rgb([0, 255, 0]),
            Self::Reposition => Rgb([0xFF, 0x80, 0x00]),
        }
    }
}

/// One drawable face annotation: contour, target oval and status message.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub contour: Vec<Point>,
    pub bounding_box: Rect,
    /// Bounds of the target oval
    pub target: Rect,
    pub message: PositionMessage,
}

struct OverlayState {
    annotations: Arc<[Annotation]>,
    frame_seq: u64,
    attached: bool,
}

pub struct Overlay {
    state: Mutex<OverlayState>,
    surface: Arc<dyn OverlaySurface>,
}

impl Overlay {
    pub fn new(surface: Arc<dyn OverlaySurface>) -> Self {
        Self {
            state: Mutex::new(OverlayState {
                annotations: Arc::from(Vec::new()),
                frame_seq: 0,
                attached: false,
            }),
            surface,
        }
    }

    fn lock(&self) -> MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start accepting updates for a fresh analysis stream.
    pub(crate) fn attach(&self) {
        let mut state = self.lock();
        state.attached = true;
        state.frame_seq = 0;
    }

    /// Clear and stop accepting updates; late results become no-ops.
    pub(crate) fn detach(&self) {
        {
            let mut state = self.lock();
            state.attached = false;
            state.annotations = Arc::from(Vec::new());
        }
        self.surface.request_redraw();
    }

    /// Replace the content with the annotations of frame `frame_seq` and request
    /// a redraw.
    ///
    /// Returns `false` without touching the content when the overlay is
    /// detached or a later frame has already been applied.
    pub fn publish(&self, frame_seq: u64, annotations: Vec<Annotation>) -> bool {
        {
            let mut state = self.lock();
            if !state.attached || frame_seq <= state.frame_seq {
                return false;
            }
            state.frame_seq = frame_seq;
            state.annotations = Arc::from(annotations);
        }
        self.surface.request_redraw();
        true
    }

    /// Remove every annotation and request a redraw.
    pub fn clear(&self) {
        self.lock().annotations = Arc::from(Vec::new());
        self.surface.request_redraw();
    }

    /// Snapshot for the draw call.
    pub fn annotations(&self) -> Arc<[Annotation]> {
        self.lock().annotations.clone()
    }

    pub fn last_frame(&self) -> u64 {
        self.lock().frame_seq
    }
}
