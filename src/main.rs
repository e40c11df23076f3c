use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use scankit::capture::WebcamProvider;
use scankit::detection::{self, TesseractTextDetector};
use scankit::overlay::OverlaySurface;
use scankit::{LifecycleEvent, ScanConfig, ScanSdk, SessionController, SessionState};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Guide the face into the oval, then capture and save it
    Face,
    /// Capture a still and print the recognized text
    Text,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// What to scan
    #[arg(value_enum)]
    mode: Mode,

    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Path to the face detection model (UltraFace ONNX file), required for face mode
    #[arg(long)]
    model: Option<String>,

    /// Tesseract language for text mode
    #[arg(long, default_value = "eng")]
    lang: String,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for saved captures, overrides the configuration file
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Seconds to wait for the camera and for a correctly positioned face
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Logs overlay repaint requests; there is no window to draw into.
struct LoggingSurface;

impl OverlaySurface for LoggingSurface {
    fn request_redraw(&self) {
        tracing::trace!("Overlay redraw requested");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("scankit starting in {:?} mode", args.mode);
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);

    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ScanConfig::default(),
    };
    if let Some(cache_dir) = &args.cache_dir {
        config.storage = scankit::config::StorageConfig::new(cache_dir);
    } else if config.storage.cache_dir.is_none() {
        config.storage = scankit::config::StorageConfig::new(std::env::temp_dir().join("scankit"));
    }

    let sdk = ScanSdk::new(config).context("Failed to initialize scan SDK")?;
    let provider = Arc::new(WebcamProvider::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
    ));
    let timeout = Duration::from_secs(args.timeout);

    match args.mode {
        Mode::Face => run_face(&sdk, provider, &args, timeout).await,
        Mode::Text => run_text(&sdk, provider, &args, timeout).await,
    }
}

async fn run_face(
    sdk: &ScanSdk,
    provider: Arc<WebcamProvider>,
    args: &Args,
    timeout: Duration,
) -> Result<()> {
    let model_path = args
        .model
        .as_deref()
        .context("Face mode needs --model <UltraFace ONNX file>")?;
    let detector = detection::create_default_face_detector(model_path)
        .context("Failed to load face detection model")?;

    let session = sdk
        .face_session(provider, detector, Arc::new(LoggingSurface))
        .context("Failed to create face session")?;

    // 0 = unknown, 1 = outside, 2 = inside
    let last_position = Arc::new(AtomicU8::new(0));
    let (position_tx, mut position_rx) = watch::channel(false);
    {
        let last_position = last_position.clone();
        session.set_position_listener(move |correct| {
            let encoded = if correct { 2 } else { 1 };
            if last_position.swap(encoded, Ordering::Relaxed) != encoded {
                if correct {
                    tracing::info!("The face position is correct");
                } else {
                    tracing::info!("Please position your face in the oval");
                }
            }
            position_tx.send_replace(correct);
        });
    }
    session.set_error_callback(|err| tracing::error!("Camera error: {}", err));

    let controller = session.controller().clone();
    controller.on_lifecycle(LifecycleEvent::Resume);
    wait_until_active(&controller, timeout).await?;

    tokio::time::timeout(timeout, position_rx.wait_for(|correct| *correct))
        .await
        .context("No correctly positioned face before the timeout")?
        .context("Position updates stopped")?;

    let saved = session.capture_to_file().await;
    controller.on_lifecycle(LifecycleEvent::Destroy);

    let path = saved.context("Face capture failed")?;
    println!("{}", path.display());
    Ok(())
}

async fn run_text(
    sdk: &ScanSdk,
    provider: Arc<WebcamProvider>,
    args: &Args,
    timeout: Duration,
) -> Result<()> {
    let detector = Arc::new(TesseractTextDetector::new(&args.lang));
    let session = sdk
        .text_session(provider, detector)
        .context("Failed to create text session")?;
    session.set_error_callback(|err| tracing::error!("Camera error: {}", err));

    let controller = session.controller().clone();
    controller.on_lifecycle(LifecycleEvent::Resume);
    wait_until_active(&controller, timeout).await?;

    let text = session.capture_text().await;
    controller.on_lifecycle(LifecycleEvent::Destroy);

    println!("{}", text.context("Text capture failed")?);
    Ok(())
}

async fn wait_until_active(controller: &SessionController, timeout: Duration) -> Result<()> {
    let mut states = controller.subscribe_state();
    let state = tokio::time::timeout(
        timeout,
        states.wait_for(|state| state.is_active() || state.is_failed()),
    )
    .await
    .context("Camera did not start before the timeout")?
    .context("Session state channel closed")?
    .clone();

    if let SessionState::Failed(reason) = state {
        bail!("Camera failed to start: {}", reason);
    }
    Ok(())
}
