#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use scankit::capture::{
    CameraProvider, Frame, FrameSink, FrameSource, ReadyCallback, SourceErrorSink, StillCallback,
    StillImage, UseCases,
};
use scankit::detection::{FaceDetection, FaceDetector, TextDetector, TextResult};
use scankit::geometry::Rect;
use scankit::overlay::OverlaySurface;
use scankit::{ScanError, SessionController, SessionState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const WAIT: Duration = Duration::from_secs(2);

/// What the fake camera does when a still is requested.
#[derive(Clone)]
pub enum StillBehavior {
    Image(Vec<u8>),
    Fail(String),
    /// Keep the callback and never answer.
    Hang,
}

pub struct FakeSource {
    pub devices: usize,
    pub bind_error: Mutex<Option<ScanError>>,
    pub binds: AtomicUsize,
    pub unbinds: AtomicUsize,
    pub bound: Mutex<Option<UseCases>>,
    pub still: Mutex<StillBehavior>,
    pub hung_stills: Mutex<Vec<StillCallback>>,
}

impl FakeSource {
    pub fn new(devices: usize) -> Arc<Self> {
        Arc::new(Self {
            devices,
            bind_error: Mutex::new(None),
            binds: AtomicUsize::new(0),
            unbinds: AtomicUsize::new(0),
            bound: Mutex::new(None),
            still: Mutex::new(StillBehavior::Image(jpeg_bytes(64, 48))),
            hung_stills: Mutex::new(Vec::new()),
        })
    }

    pub fn set_still(&self, behavior: StillBehavior) {
        *self.still.lock().unwrap() = behavior;
    }

    pub fn fail_binding(&self, err: ScanError) {
        *self.bind_error.lock().unwrap() = Some(err);
    }

    pub fn analysis_sink(&self) -> Option<FrameSink> {
        self.bound
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|use_cases| use_cases.analysis.clone())
    }

    pub fn error_sink(&self) -> Option<SourceErrorSink> {
        self.bound
            .lock()
            .unwrap()
            .as_ref()
            .map(|use_cases| use_cases.errors.clone())
    }

    pub fn is_bound(&self) -> bool {
        self.bound.lock().unwrap().is_some()
    }
}

impl FrameSource for FakeSource {
    fn available_devices(&self) -> usize {
        self.devices
    }

    fn bind(&self, use_cases: UseCases) -> scankit::Result<()> {
        if let Some(err) = self.bind_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.binds.fetch_add(1, Ordering::SeqCst);
        *self.bound.lock().unwrap() = Some(use_cases);
        Ok(())
    }

    fn unbind(&self) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
        self.bound.lock().unwrap().take();
    }

    fn take_picture(&self, on_captured: StillCallback) {
        let behavior = self.still.lock().unwrap().clone();
        match behavior {
            StillBehavior::Image(bytes) => on_captured(Ok(StillImage::new(bytes))),
            StillBehavior::Fail(message) => on_captured(Err(ScanError::capture(message))),
            StillBehavior::Hang => self.hung_stills.lock().unwrap().push(on_captured),
        }
    }
}

/// Provider that either answers immediately or holds the callback until
/// [`FakeProvider::make_ready`].
pub struct FakeProvider {
    pub source: Arc<FakeSource>,
    pub deferred: bool,
    pub requests: AtomicUsize,
    pub pending: Mutex<Option<ReadyCallback>>,
}

impl FakeProvider {
    pub fn ready(source: Arc<FakeSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            deferred: false,
            requests: AtomicUsize::new(0),
            pending: Mutex::new(None),
        })
    }

    pub fn deferred(source: Arc<FakeSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            deferred: true,
            requests: AtomicUsize::new(0),
            pending: Mutex::new(None),
        })
    }

    /// Fire the held callback, if any. Returns whether one was held.
    pub fn make_ready(&self) -> bool {
        let pending = self.pending.lock().unwrap().take();
        match pending {
            Some(callback) => {
                callback(Ok(self.source.clone()));
                true
            }
            None => false,
        }
    }
}

impl CameraProvider for FakeProvider {
    fn when_ready(&self, on_ready: ReadyCallback) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.deferred {
            *self.pending.lock().unwrap() = Some(on_ready);
        } else {
            on_ready(Ok(self.source.clone()));
        }
    }
}

/// Face detector answering from a script; an empty script means no faces.
#[derive(Default)]
pub struct ScriptedFaceDetector {
    pub script: Mutex<VecDeque<anyhow::Result<Vec<FaceDetection>>>>,
    pub calls: AtomicUsize,
    /// When set, every detection waits for a permit.
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedFaceDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn push(&self, result: anyhow::Result<Vec<FaceDetection>>) {
        self.script.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl FaceDetector for ScriptedFaceDetector {
    async fn detect(&self, _frame: &Frame) -> anyhow::Result<Vec<FaceDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub struct ScriptedTextDetector {
    pub result: Mutex<Option<anyhow::Result<TextResult>>>,
}

impl ScriptedTextDetector {
    pub fn lines(lines: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(Ok(TextResult::from_lines(lines.iter().copied())))),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(Err(anyhow::anyhow!(message.to_string())))),
        })
    }
}

#[async_trait]
impl TextDetector for ScriptedTextDetector {
    async fn detect(&self, _image: &StillImage) -> anyhow::Result<TextResult> {
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(TextResult::default()))
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    pub redraws: AtomicUsize,
}

impl OverlaySurface for RecordingSurface {
    fn request_redraw(&self) {
        self.redraws.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects every position notification.
#[derive(Default)]
pub struct PositionLog {
    pub values: Mutex<Vec<bool>>,
}

impl PositionLog {
    pub fn snapshot(&self) -> Vec<bool> {
        self.values.lock().unwrap().clone()
    }
}

pub fn face(left: f32, top: f32, right: f32, bottom: f32) -> FaceDetection {
    let bounding_box = Rect::new(left, top, right, bottom);
    FaceDetection {
        contour_points: bounding_box.corners().to_vec(),
        bounding_box,
    }
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([90, 120, 150]));
    scankit::imaging::encode_jpeg(&image, 90).unwrap()
}

/// A frame whose release bumps `released`.
pub fn frame(width: u32, height: u32, released: &Arc<AtomicUsize>) -> Frame {
    let released = released.clone();
    Frame::new(RgbImage::new(width, height)).on_release(move || {
        released.fetch_add(1, Ordering::SeqCst);
    })
}

pub async fn wait_for_state(
    controller: &SessionController,
    predicate: impl Fn(&SessionState) -> bool,
) -> SessionState {
    let mut states = controller.subscribe_state();
    let state = tokio::time::timeout(WAIT, states.wait_for(|state| predicate(state)))
        .await
        .expect("timed out waiting for session state")
        .expect("state channel closed")
        .clone();
    state
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
