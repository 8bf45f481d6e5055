//! Timeout and cancellation around collaborator calls.
//!
//! Each call runs on a blocking task of a small tokio runtime so that a
//! stalled backend surfaces as [`CarbonError::RetrievalTimeout`] instead of
//! hanging the pipeline. A timed-out task is abandoned, not killed.

use crate::types::{CarbonError, CarbonResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Caller-owned cancellation flag, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs retrieval closures with a deadline
pub struct Retriever {
    runtime: Option<Runtime>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Retriever {
    pub fn new(timeout: Duration) -> CarbonResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("carbonmap-retrieval")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            timeout,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn check_cancelled(&self) -> CarbonResult<()> {
        if self.cancel.is_cancelled() {
            Err(CarbonError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `f` with the configured deadline.
    ///
    /// Cancellation is checked before the call starts and after it returns.
    /// Calling from inside an async runtime returns `Processing` instead of
    /// blocking that runtime.
    pub fn fetch<T, F>(&self, what: &str, f: F) -> CarbonResult<T>
    where
        F: FnOnce() -> CarbonResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.check_cancelled()?;
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(CarbonError::Processing(format!(
                "retrieval of {} cannot block inside an async runtime; call from spawn_blocking",
                what
            )));
        }
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| CarbonError::Processing("retrieval runtime shut down".to_string()))?;

        log::debug!("Retrieving {} (timeout {:?})", what, self.timeout);
        let timeout = self.timeout;
        let outcome = runtime.block_on(async move {
            let handle = tokio::task::spawn_blocking(f);
            tokio::time::timeout(timeout, handle).await
        });

        let value = match outcome {
            Err(_) => {
                log::warn!("Retrieval of {} timed out after {:?}", what, timeout);
                return Err(CarbonError::RetrievalTimeout {
                    what: what.to_string(),
                    timeout,
                });
            }
            Ok(Err(join_error)) => {
                return Err(CarbonError::Processing(format!(
                    "retrieval of {} failed: {}",
                    what, join_error
                )))
            }
            Ok(Ok(result)) => result?,
        };

        self.check_cancelled()?;
        Ok(value)
    }
}

impl Drop for Retriever {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
