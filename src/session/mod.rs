//! Capture session state machine.
//!
//! A [`SessionController`] owns the binding between one camera source and a
//! host lifecycle. Variant-specific behaviour (which lens, whether frames are
//! analysed) comes from a [`SessionVariant`] chosen at construction.

mod executor;

pub use executor::SessionExecutor;

use crate::analysis::{self, FrameAnalyzer};
use crate::capture::{
    latest_frame_channel, provider_ready, take_still, CameraProvider, FrameSource, LensFacing,
    SourceErrorSink, StillImage, UseCases,
};
use crate::config::SessionConfig;
use crate::error::{Result, ScanError};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Stopped,
    Failed(ScanError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Host lifecycle signals a session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Resume,
    Pause,
    /// The host is gone for good; the session cannot be restarted.
    Destroy,
}

pub type ErrorCallback = Arc<dyn Fn(&ScanError) + Send + Sync>;

/// What distinguishes one kind of scan session from another.
pub trait SessionVariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn lens(&self) -> LensFacing;

    /// Analyzer fed by the continuous frame stream, if the variant runs one.
    fn analyzer(&self) -> Option<Arc<dyn FrameAnalyzer>> {
        None
    }
}

struct Core {
    state: SessionState,
    /// Bumped on every start and stop; results tagged with an older epoch are stale.
    epoch: u64,
    source: Option<Arc<dyn FrameSource>>,
    pending_start: Option<AbortHandle>,
    active: Option<CancellationToken>,
    destroyed: bool,
}

/// Resources taken out of an active session, released after the state lock.
struct Teardown {
    epoch: u64,
    source: Option<Arc<dyn FrameSource>>,
}

struct Shared {
    provider: Arc<dyn CameraProvider>,
    variant: Arc<dyn SessionVariant>,
    config: SessionConfig,
    executor: SessionExecutor,
    core: Mutex<Core>,
    state_tx: watch::Sender<SessionState>,
    error_callback: RwLock<Option<ErrorCallback>>,
}

/// Handle to a capture session. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        variant: Arc<dyn SessionVariant>,
        config: SessionConfig,
    ) -> Result<Self> {
        let executor = SessionExecutor::new(&config.executor_thread_name).map_err(|err| {
            ScanError::SourceBindingFailed(format!("Failed to start session executor: {}", err))
        })?;
        let (state_tx, _) = watch::channel(SessionState::Idle);

        Ok(Self {
            shared: Arc::new(Shared {
                provider,
                variant,
                config,
                executor,
                core: Mutex::new(Core {
                    state: SessionState::Idle,
                    epoch: 0,
                    source: None,
                    pending_start: None,
                    active: None,
                    destroyed: false,
                }),
                state_tx,
                error_callback: RwLock::new(None),
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock_core().state.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Register the callback invoked once per failed start or source failure.
    pub fn set_error_callback(&self, callback: impl Fn(&ScanError) + Send + Sync + 'static) {
        *self
            .shared
            .error_callback
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(callback));
    }

    pub fn on_lifecycle(&self, event: LifecycleEvent) {
        tracing::debug!("{} session lifecycle event {:?}", self.shared.variant.name(), event);
        match event {
            LifecycleEvent::Resume => self.start(),
            LifecycleEvent::Pause => self.stop(),
            LifecycleEvent::Destroy => self.destroy(),
        }
    }

    /// Begin acquiring the camera. Returns immediately; no-op while starting
    /// or active.
    pub fn start(&self) {
        let shared = &self.shared;
        let mut core = shared.lock_core();

        if core.destroyed {
            tracing::warn!("Ignoring start of a destroyed {} session", shared.variant.name());
            return;
        }
        if matches!(core.state, SessionState::Starting | SessionState::Active) {
            tracing::debug!("{} session already {}", shared.variant.name(), core.state);
            return;
        }

        core.epoch += 1;
        let epoch = core.epoch;
        shared.set_state(&mut core, SessionState::Starting);

        let weak = Arc::downgrade(shared);
        let provider = shared.provider.clone();
        let timeout = shared.config.provider_timeout();
        let task = shared.executor.spawn(async move {
            let acquired = match timeout {
                Some(limit) => tokio::time::timeout(limit, provider_ready(provider.as_ref()))
                    .await
                    .unwrap_or_else(|_| {
                        tracing::warn!("Camera provider not ready after {:?}", limit);
                        Err(ScanError::NoDeviceAvailable)
                    }),
                None => provider_ready(provider.as_ref()).await,
            };
            if let Some(shared) = weak.upgrade() {
                Shared::complete_start(&shared, epoch, acquired);
            }
        });
        core.pending_start = Some(task.abort_handle());
    }

    /// Unbind the camera and halt analysis. Returns immediately; the unbind
    /// runs on the session executor ahead of any later start.
    pub fn stop(&self) {
        let Some(teardown) = self.shared.begin_stop() else {
            return;
        };
        let shared = self.shared.clone();
        let _ = self
            .shared
            .executor
            .spawn(async move { shared.finish_stop(teardown) });
    }

    /// Stop synchronously and shut the session executor down for good.
    pub fn destroy(&self) {
        if let Some(teardown) = self.shared.begin_stop() {
            self.shared.finish_stop(teardown);
        }
        self.shared.lock_core().destroyed = true;
        self.shared.executor.shutdown();
        tracing::info!("{} session destroyed", self.shared.variant.name());
    }

    /// Take one still image from the bound source.
    ///
    /// Fails with [`ScanError::SessionInactive`] unless the session is active,
    /// and with [`ScanError::Cancelled`] if it stops before the image arrives.
    pub async fn capture_still(&self) -> Result<StillImage> {
        let (source, token) = self.shared.active_source()?;
        tokio::select! {
            _ = token.cancelled() => Err(ScanError::Cancelled),
            still = take_still(source.as_ref()) => still,
        }
    }

    /// Run `future` on the session executor.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.shared.executor.spawn(future);
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("variant", &self.shared.variant.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, core: &mut Core, state: SessionState) {
        tracing::debug!(
            "{} session: {} -> {}",
            self.variant.name(),
            core.state,
            state
        );
        core.state = state.clone();
        self.state_tx.send_replace(state);
    }

    fn error_callback(&self) -> Option<ErrorCallback> {
        self.error_callback
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn active_source(&self) -> Result<(Arc<dyn FrameSource>, CancellationToken)> {
        let core = self.lock_core();
        match (&core.state, &core.source, &core.active) {
            (SessionState::Active, Some(source), Some(token)) => Ok((source.clone(), token.clone())),
            _ => Err(ScanError::SessionInactive),
        }
    }

    fn source_error_sink(self: &Arc<Self>, epoch: u64) -> SourceErrorSink {
        let weak: Weak<Self> = Arc::downgrade(self);
        SourceErrorSink::new(move |err| {
            if let Some(shared) = weak.upgrade() {
                shared.fail(epoch, err);
            }
        })
    }

    fn complete_start(self: &Arc<Self>, epoch: u64, acquired: Result<Arc<dyn FrameSource>>) {
        {
            let mut core = self.lock_core();
            if core.epoch != epoch || !matches!(core.state, SessionState::Starting) {
                tracing::debug!("Ignoring camera provider result for a superseded start");
                return;
            }
            core.pending_start = None;
        }

        let source = match acquired {
            Ok(source) => source,
            Err(err) => return self.fail(epoch, err),
        };
        if source.available_devices() == 0 {
            tracing::warn!("No cameras found");
            return self.fail(epoch, ScanError::NoDeviceAvailable);
        }

        let analysis = self.variant.analyzer().map(|analyzer| {
            let (sink, receiver) = latest_frame_channel();
            (analyzer, sink, receiver)
        });
        let use_cases = UseCases {
            lens: self.variant.lens(),
            preview: true,
            still_capture: true,
            analysis: analysis.as_ref().map(|(_, sink, _)| sink.clone()),
            errors: self.source_error_sink(epoch),
        };

        source.unbind();
        if let Err(err) = source.bind(use_cases) {
            let err = match err {
                ScanError::SourceBindingFailed(_) => err,
                other => ScanError::SourceBindingFailed(other.to_string()),
            };
            return self.fail(epoch, err);
        }

        let mut core = self.lock_core();
        if core.epoch != epoch || !matches!(core.state, SessionState::Starting) {
            drop(core);
            tracing::debug!("Session stopped while binding, releasing camera");
            source.unbind();
            return;
        }

        let token = CancellationToken::new();
        if let Some((analyzer, _sink, receiver)) = analysis {
            analyzer.attach();
            let _ = self
                .executor
                .spawn(analysis::run_loop(analyzer, receiver, token.clone()));
        }
        core.source = Some(source);
        core.active = Some(token);
        self.set_state(&mut core, SessionState::Active);
        drop(core);

        tracing::info!("{} session active", self.variant.name());
    }

    /// Move to `Failed` and notify the owner, once per start attempt.
    fn fail(&self, epoch: u64, err: ScanError) {
        let (source, token) = {
            let mut core = self.lock_core();
            if core.epoch != epoch
                || matches!(
                    core.state,
                    SessionState::Failed(_) | SessionState::Stopping | SessionState::Stopped
                )
            {
                tracing::debug!("Ignoring stale session failure: {}", err);
                return;
            }
            core.pending_start = None;
            let teardown = (core.source.take(), core.active.take());
            self.set_state(&mut core, SessionState::Failed(err.clone()));
            teardown
        };

        if let Some(token) = token {
            token.cancel();
        }
        if let Some(analyzer) = self.variant.analyzer() {
            analyzer.detach();
        }
        if let Some(source) = source {
            source.unbind();
        }

        tracing::warn!("{} session failed: {}", self.variant.name(), err);
        if let Some(callback) = self.error_callback() {
            callback(&err);
        }
    }

    fn begin_stop(&self) -> Option<Teardown> {
        let (teardown, token) = {
            let mut core = self.lock_core();
            if matches!(
                core.state,
                SessionState::Idle
                    | SessionState::Stopping
                    | SessionState::Stopped
                    | SessionState::Failed(_)
            ) {
                tracing::debug!("{} session already {}", self.variant.name(), core.state);
                return None;
            }

            core.epoch += 1;
            if let Some(pending) = core.pending_start.take() {
                pending.abort();
            }
            self.set_state(&mut core, SessionState::Stopping);
            (
                Teardown {
                    epoch: core.epoch,
                    source: core.source.take(),
                },
                core.active.take(),
            )
        };

        // halt analysis and in-flight captures before the camera goes away
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(analyzer) = self.variant.analyzer() {
            analyzer.detach();
        }
        Some(teardown)
    }

    fn finish_stop(&self, teardown: Teardown) {
        if let Some(source) = teardown.source {
            source.unbind();
        }
        let mut core = self.lock_core();
        if core.epoch == teardown.epoch && matches!(core.state, SessionState::Stopping) {
            self.set_state(&mut core, SessionState::Stopped);
            drop(core);
            tracing::info!("{} session stopped", self.variant.name());
        }
    }
}
