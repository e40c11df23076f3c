use std::future::Future;
use std::sync::Mutex;
use std::thread::JoinHandle;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

/// A single-threaded runtime on a dedicated thread, owned by one session.
///
/// Camera binding, analysis and capture work run here in submission order.
pub struct SessionExecutor {
    handle: Handle,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SessionExecutor {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                tracing::debug!("Session executor stopped");
            })?;

        Ok(Self {
            handle,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Run `future` on the session thread. After shutdown the future is dropped
    /// without being polled.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Stop the runtime and wait for its thread. Idempotent.
    pub fn shutdown(&self) {
        let signal = self
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(signal) = signal {
            let _ = signal.send(());
        }

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(thread) = thread {
            // the last owner may be a task on the session thread itself
            if thread.thread().id() == std::thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("Session executor thread panicked");
            }
        }
    }
}

impl Drop for SessionExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_tasks_on_its_own_thread() {
        let executor = SessionExecutor::new("test-session").unwrap();
        let name = executor
            .spawn(async { std::thread::current().name().map(str::to_string) })
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("test-session"));
    }

    #[tokio::test]
    async fn tasks_after_shutdown_never_run() {
        let executor = SessionExecutor::new("test-session").unwrap();
        executor.shutdown();
        assert!(executor.is_shut_down());

        let result = executor.spawn(async { 1 }).await;
        assert!(result.is_err());
        // second shutdown is a no-op
        executor.shutdown();
    }
}
