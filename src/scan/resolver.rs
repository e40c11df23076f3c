use crate::error::{Result, ScanError};

type SuccessFn<T> = Box<dyn FnOnce(T) + Send>;
type ErrorFn = Box<dyn FnOnce(String) + Send>;

/// Holds a success/error callback pair and fires exactly one of them.
///
/// Dropping an unresolved resolver (e.g. its task never ran because the
/// session was destroyed) reports [`ScanError::Cancelled`].
pub(crate) struct Resolver<T> {
    on_success: Option<SuccessFn<T>>,
    on_error: Option<ErrorFn>,
}

impl<T> Resolver<T> {
    pub(crate) fn new(
        on_success: impl FnOnce(T) + Send + 'static,
        on_error: impl FnOnce(String) + Send + 'static,
    ) -> Self {
        Self {
            on_success: Some(Box::new(on_success)),
            on_error: Some(Box::new(on_error)),
        }
    }

    pub(crate) fn resolve(mut self, result: Result<T>) {
        let on_success = self.on_success.take();
        let on_error = self.on_error.take();
        match result {
            Ok(value) => {
                if let Some(on_success) = on_success {
                    on_success(value);
                }
            }
            Err(err) => {
                tracing::debug!("Scan operation failed: {}", err);
                if let Some(on_error) = on_error {
                    on_error(err.message());
                }
            }
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(on_error) = self.on_error.take() {
            on_error(ScanError::Cancelled.message());
        }
    }
}
