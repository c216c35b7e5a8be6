//! Tokio adapter for asynchronous execution backends.
//!
//! The scheduler calls its backend synchronously. [`TokioBackend`] owns a
//! dedicated single-threaded runtime and drives an
//! [`AsyncExecutionBackend`] to completion on it, so async backends plug in
//! without the scheduler itself becoming async.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::core::{BackendError, ExecutionBackend, ExecutionOutcome, OperationBlock};
use crate::util::serde::UnitId;

/// Asynchronous counterpart of [`ExecutionBackend`].
#[async_trait]
pub trait AsyncExecutionBackend: Send + Sync {
    /// Execute `block` on `units`; same binding rules as the sync trait.
    async fn run(
        &self,
        block: &OperationBlock,
        units: &[UnitId],
    ) -> Result<ExecutionOutcome, BackendError>;
}

/// Synchronous [`ExecutionBackend`] driving an async backend on its own
/// current-thread runtime.
///
/// Owning a runtime means the value must be created and dropped outside
/// async contexts; from async code, build and use it inside
/// `tokio::task::spawn_blocking`.
pub struct TokioBackend<A: AsyncExecutionBackend> {
    inner: Arc<A>,
    runtime: Runtime,
    timeout: Option<Duration>,
}

impl<A: AsyncExecutionBackend> TokioBackend<A> {
    /// Wrap `inner` with a fresh runtime.
    pub fn new(inner: A) -> Result<Self, std::io::Error> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner: Arc::new(inner),
            runtime,
            timeout: None,
        })
    }

    /// Fail runs that take longer than `timeout` of wall-clock time.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    async fn run_async(
        &self,
        block: &OperationBlock,
        units: &[UnitId],
    ) -> Result<ExecutionOutcome, BackendError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.run(block, units))
                .await
                .map_err(|_| {
                    tracing::warn!(block = block.name(), ?limit, "backend run timed out");
                    BackendError::new(format!("run of `{}` timed out after {limit:?}", block.name()))
                })?,
            None => self.inner.run(block, units).await,
        }
    }
}

impl<A: AsyncExecutionBackend> ExecutionBackend for TokioBackend<A> {
    fn run(&self, block: &OperationBlock, units: &[UnitId]) -> Result<ExecutionOutcome, BackendError> {
        if Handle::try_current().is_err() {
            return self.runtime.block_on(self.run_async(block, units));
        }
        // Blocking inside a running runtime panics; hop to a scoped thread.
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.runtime.block_on(self.run_async(block, units)))
                .join()
                .unwrap_or_else(|_| Err(BackendError::new("backend worker thread panicked")))
        })
    }
}
