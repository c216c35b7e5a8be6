//! Execution backend seam and a deterministic in-process backend.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::block::OperationBlock;
use crate::core::operation::OperationKind;
use crate::core::BackendError;
use crate::util::serde::UnitId;

/// What a backend reports for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// One entry per measurement, in execution order.
    pub measurement_results: Vec<bool>,
    /// Ticks the run took. `None` means "use the estimate".
    pub actual_duration: Option<u64>,
}

/// Runs a block against physical units.
///
/// The scheduler calls `run` exactly once per `Running` transition, from the
/// controlling thread, and waits for the result.
pub trait ExecutionBackend: Send + Sync {
    /// Execute `block`. The `k`-th smallest block-local index in
    /// `block.unit_ids()` is bound to `units[k]`.
    fn run(&self, block: &OperationBlock, units: &[UnitId]) -> Result<ExecutionOutcome, BackendError>;
}

impl<B: ExecutionBackend + ?Sized> ExecutionBackend for Box<B> {
    fn run(&self, block: &OperationBlock, units: &[UnitId]) -> Result<ExecutionOutcome, BackendError> {
        (**self).run(block, units)
    }
}

impl<B: ExecutionBackend + ?Sized> ExecutionBackend for std::sync::Arc<B> {
    fn run(&self, block: &OperationBlock, units: &[UnitId]) -> Result<ExecutionOutcome, BackendError> {
        (**self).run(block, units)
    }
}

/// Deterministic backend for tests, benches and dry runs.
///
/// Duration is block depth times `ticks_per_layer`; every measurement reads
/// `false`. Blocks whose name was registered through
/// [`SimulatedBackend::failing_on`] fail instead.
#[derive(Debug)]
pub struct SimulatedBackend {
    ticks_per_layer: u64,
    report_duration: bool,
    failing_blocks: BTreeSet<String>,
    runs: AtomicU64,
}

impl SimulatedBackend {
    /// One tick per layer, durations reported.
    pub fn new() -> Self {
        Self::with_ticks_per_layer(1)
    }

    /// Custom tick cost per layer of depth.
    pub fn with_ticks_per_layer(ticks_per_layer: u64) -> Self {
        Self {
            ticks_per_layer,
            report_duration: true,
            failing_blocks: BTreeSet::new(),
            runs: AtomicU64::new(0),
        }
    }

    /// Fail every run of a block with this name.
    #[must_use]
    pub fn failing_on(mut self, block_name: impl Into<String>) -> Self {
        self.failing_blocks.insert(block_name.into());
        self
    }

    /// Leave `actual_duration` unset so the scheduler falls back to its
    /// estimate.
    #[must_use]
    pub fn without_duration(mut self) -> Self {
        self.report_duration = false;
        self
    }

    /// Number of `run` calls so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBackend for SimulatedBackend {
    fn run(&self, block: &OperationBlock, units: &[UnitId]) -> Result<ExecutionOutcome, BackendError> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if self.failing_blocks.contains(block.name()) {
            tracing::warn!(block = block.name(), "simulated backend failure");
            return Err(BackendError::new(format!("injected failure for `{}`", block.name())));
        }
        if block.cost().unit_count > units.len() {
            return Err(BackendError::new(format!(
                "block `{}` needs {} units, {} bound",
                block.name(),
                block.cost().unit_count,
                units.len()
            )));
        }
        let measurements = block
            .flatten()
            .iter()
            .filter(|op| op.kind() == OperationKind::Measure)
            .count();
        let duration = block.cost().depth_estimate.saturating_mul(self.ticks_per_layer);
        tracing::debug!(block = block.name(), units = units.len(), duration, "simulated run");
        Ok(ExecutionOutcome {
            measurement_results: vec![false; measurements],
            actual_duration: self.report_duration.then_some(duration),
        })
    }
}
