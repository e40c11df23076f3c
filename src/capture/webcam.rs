use super::{
    CameraProvider, Frame, FrameSource, ReadyCallback, StillCallback, StillImage, UseCases,
};
use crate::error::{Result, ScanError};
use crate::imaging;
use anyhow::Context;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const STILL_QUALITY: u8 = 95;

/// Camera provider backed by a local webcam.
pub struct WebcamProvider {
    device_index: u32,
    width: u32,
    height: u32,
}

impl WebcamProvider {
    pub fn new(device_index: u32, width: u32, height: u32) -> Self {
        Self {
            device_index,
            width,
            height,
        }
    }
}

impl CameraProvider for WebcamProvider {
    fn when_ready(&self, on_ready: ReadyCallback) {
        let (device_index, width, height) = (self.device_index, self.width, self.height);
        let spawned = std::thread::Builder::new()
            .name("webcam-query".to_string())
            .spawn(move || {
                let devices = match nokhwa::query(ApiBackend::Auto) {
                    Ok(devices) => devices.len(),
                    Err(err) => {
                        tracing::warn!("Failed to enumerate cameras: {}", err);
                        0
                    }
                };
                tracing::info!("Found {} camera device(s)", devices);
                let source: Arc<dyn FrameSource> =
                    Arc::new(WebcamSource::new(device_index, width, height, devices));
                on_ready(Ok(source));
            });
        if let Err(err) = spawned {
            tracing::error!("Failed to spawn camera query thread: {}", err);
        }
    }
}

enum Command {
    Still(StillCallback),
    Stop,
}

struct Worker {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Ask the capture thread to finish and wait for it, unless this is the
    /// capture thread itself (a stream failure unbinds from there).
    fn stop(self) {
        let _ = self.commands.send(Command::Stop);
        if self.handle.thread().id() == std::thread::current().id() {
            tracing::debug!("Webcam unbound from its capture thread, not joining");
            return;
        }
        if self.handle.join().is_err() {
            tracing::error!("Webcam capture thread panicked");
        }
    }
}

/// A webcam opened on its own capture thread.
///
/// The camera handle never leaves that thread; still requests are sent to it
/// and answered with the next decoded frame.
pub struct WebcamSource {
    device_index: u32,
    width: u32,
    height: u32,
    devices: usize,
    worker: Mutex<Option<Worker>>,
}

impl WebcamSource {
    fn new(device_index: u32, width: u32, height: u32, devices: usize) -> Self {
        Self {
            device_index,
            width,
            height,
            devices,
            worker: Mutex::new(None),
        }
    }

    fn open_camera(device_index: u32) -> anyhow::Result<Camera> {
        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;
        camera
            .open_stream()
            .context("Failed to open camera stream")?;
        Ok(camera)
    }

    fn capture_frame(camera: &mut Camera) -> anyhow::Result<RgbImage> {
        let frame = camera.frame().context("Failed to capture frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;
        Ok(decoded)
    }

    fn run(
        mut camera: Camera,
        use_cases: UseCases,
        commands: Receiver<Command>,
        width: u32,
        height: u32,
    ) {
        let mut pending_stills: Vec<StillCallback> = Vec::new();
        let mut failure = None;
        loop {
            match commands.try_recv() {
                Ok(Command::Still(callback)) => pending_stills.push(callback),
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let frame = match Self::capture_frame(&mut camera) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::error!("Webcam stream failed: {:#}", err);
                    let message = format!("{:#}", err);
                    for callback in pending_stills.drain(..) {
                        callback(Err(ScanError::capture(&message)));
                    }
                    failure = Some(message);
                    break;
                }
            };

            let frame = if frame.dimensions() != (width, height) {
                image::imageops::resize(
                    &frame,
                    width,
                    height,
                    image::imageops::FilterType::Triangle,
                )
            } else {
                frame
            };

            for callback in pending_stills.drain(..) {
                let still = imaging::encode_jpeg(&frame, STILL_QUALITY)
                    .map(StillImage::new)
                    .map_err(ScanError::capture);
                callback(still);
            }

            if let Some(sink) = &use_cases.analysis {
                if !sink.offer(Frame::new(frame)) {
                    tracing::debug!("Analysis sink closed, frame discarded");
                }
            }
        }

        if let Err(err) = camera.stop_stream() {
            tracing::warn!("Failed to stop webcam stream: {}", err);
        }
        for callback in pending_stills.drain(..) {
            callback(Err(ScanError::Cancelled));
        }
        tracing::info!("Webcam capture thread stopped");

        // the session unbinds from inside this call, on this thread
        if let Some(message) = failure {
            use_cases.errors.report(ScanError::SourceFailed(message));
        }
    }
}

impl FrameSource for WebcamSource {
    fn available_devices(&self) -> usize {
        self.devices
    }

    fn bind(&self, use_cases: UseCases) -> Result<()> {
        self.unbind();

        tracing::info!(
            "Binding webcam {} at {}x{} ({:?} lens requested)",
            self.device_index,
            self.width,
            self.height,
            use_cases.lens
        );

        let (commands_tx, commands_rx) = mpsc::channel();
        let (opened_tx, opened_rx) = mpsc::channel::<std::result::Result<(), String>>();
        let (device_index, width, height) = (self.device_index, self.width, self.height);

        let handle = std::thread::Builder::new()
            .name(format!("webcam-{}", device_index))
            .spawn(move || match Self::open_camera(device_index) {
                Ok(camera) => {
                    let _ = opened_tx.send(Ok(()));
                    Self::run(camera, use_cases, commands_rx, width, height);
                }
                Err(err) => {
                    let _ = opened_tx.send(Err(format!("{:#}", err)));
                }
            })
            .map_err(|err| ScanError::SourceBindingFailed(err.to_string()))?;

        // blocks the session executor until the camera opens; nothing else
        // is scheduled there while the session is starting
        match opened_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("Webcam initialized successfully");
                *self.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(Worker {
                    commands: commands_tx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(ScanError::SourceBindingFailed(message))
            }
            Err(_) => Err(ScanError::SourceBindingFailed(
                "Capture thread exited during start-up".to_string(),
            )),
        }
    }

    fn unbind(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    fn take_picture(&self, on_captured: StillCallback) {
        let guard = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(worker) => {
                if let Err(mpsc::SendError(Command::Still(callback))) =
                    worker.commands.send(Command::Still(on_captured))
                {
                    callback(Err(ScanError::capture("Camera is not streaming")));
                }
            }
            None => on_captured(Err(ScanError::capture("Camera is not bound"))),
        }
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.unbind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Installs a worker whose thread waits for `go`, then runs `body`.
    fn install_worker(
        source: &Arc<WebcamSource>,
        body: impl FnOnce(&WebcamSource, &Receiver<Command>) + Send + 'static,
    ) -> (Sender<()>, Receiver<()>) {
        let (commands_tx, commands_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();
        let thread_source = source.clone();
        let handle = std::thread::spawn(move || {
            if go_rx.recv().is_ok() {
                body(&thread_source, &commands_rx);
                let _ = done_tx.send(());
            }
        });
        *source.worker.lock().unwrap() = Some(Worker {
            commands: commands_tx,
            handle,
        });
        (go_tx, done_rx)
    }

    #[test]
    fn unbind_from_the_capture_thread_does_not_join_itself() {
        let source = Arc::new(WebcamSource::new(0, 64, 48, 1));
        let (go, done) = install_worker(&source, |source, _commands| source.unbind());

        go.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(2))
            .expect("unbind on the capture thread did not return");
        assert!(source.worker.lock().unwrap().is_none());
    }

    #[test]
    fn unbind_stops_and_joins_the_capture_thread() {
        let source = Arc::new(WebcamSource::new(0, 64, 48, 1));
        let (go, done) = install_worker(&source, |_source, commands| {
            assert!(matches!(commands.recv(), Ok(Command::Stop)));
        });

        go.send(()).unwrap();
        source.unbind();
        // joined, so the thread has already signalled
        assert!(done.try_recv().is_ok());
        assert!(source.worker.lock().unwrap().is_none());
    }

    #[test]
    fn still_requests_fail_when_unbound() {
        let source = WebcamSource::new(0, 64, 48, 1);
        let (tx, rx) = mpsc::channel();
        source.take_picture(Box::new(move |still| {
            let _ = tx.send(still.map(|_| ()));
        }));
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.message(), "Camera is not bound");
    }
}
