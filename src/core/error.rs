//! Error types for pool, IR, queue and scheduler operations.

use thiserror::Error;

use crate::core::job::JobState;
use crate::core::operation::OperationKind;
use crate::util::serde::{JobId, OperationId, UnitId, UnitIndex};

/// Errors produced by the unit pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No free unit is left to allocate.
    #[error("unit pool exhausted")]
    ExhaustedPool,
    /// The id was never issued by this pool, or the unit is already free.
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
}

/// Structural and semantic errors in operation blocks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    /// Target count does not match the arity of the operation kind.
    #[error("operation {operation} ({kind:?}) expects {expected} distinct targets, got {actual}")]
    ArityMismatch {
        /// Offending operation.
        operation: OperationId,
        /// Kind whose arity was violated.
        kind: OperationKind,
        /// Arity implied by the kind.
        expected: usize,
        /// Distinct targets supplied.
        actual: usize,
    },
    /// Parameter count does not match what the operation kind requires.
    #[error("operation {operation} ({kind:?}) expects {expected} parameters, got {actual}")]
    ParameterCountMismatch {
        /// Offending operation.
        operation: OperationId,
        /// Kind whose parameter count was violated.
        kind: OperationKind,
        /// Parameters required by the kind.
        expected: usize,
        /// Parameters supplied.
        actual: usize,
    },
    /// A target index lies outside the permitted range.
    #[error("operation {operation} targets unit index {index}, max is {max}")]
    OutOfRangeUnitIndex {
        /// Offending operation.
        operation: OperationId,
        /// Out-of-range index.
        index: UnitIndex,
        /// Largest permitted index.
        max: UnitIndex,
    },
    /// The block contains an irreversible-terminal operation.
    #[error("block `{0}` is not reversible")]
    NotReversible(String),
}

/// Errors produced by the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The requested state change is not an edge of the job state machine.
    #[error("job {job}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Job being transitioned.
        job: JobId,
        /// Current state.
        from: JobState,
        /// Requested state.
        to: JobState,
    },
    /// No live or archived job has this id.
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    /// The dependency edge would make the job wait on itself.
    #[error("dependency cycle through job {0}")]
    CyclicDependency(JobId),
}

/// Failure reported by an execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend error: {0}")]
pub struct BackendError(pub String);

impl BackendError {
    /// Build a backend error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors produced by scheduler components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// The pool cannot satisfy the full unit request right now.
    #[error("insufficient units: requested {requested}, available {available}")]
    InsufficientUnits {
        /// Units the job needs.
        requested: usize,
        /// Units currently free.
        available: usize,
    },
    /// Candidate units are already held by a scheduled or running job.
    #[error("resource conflict on units {units:?} held by job {holder}")]
    ResourceConflict {
        /// Job currently holding the units.
        holder: JobId,
        /// Overlapping unit ids.
        units: Vec<UnitId>,
    },
    /// At least one dependency has not completed yet.
    #[error("job {0} has unmet dependencies")]
    DependenciesNotMet(JobId),
    /// The job needs more units than the pool will ever own.
    #[error("job needs {requested} units but the pool only has {total}")]
    ExceedsCapacity {
        /// Units the job needs.
        requested: usize,
        /// Pool size.
        total: usize,
    },
    /// The submitted block touches no units.
    #[error("block `{0}` touches no units")]
    EmptyBlock(String),
    /// The submitted block failed structural validation.
    #[error("block `{name}` failed validation with {} violation(s)", .violations.len())]
    InvalidBlock {
        /// Block name.
        name: String,
        /// Every violation found.
        violations: Vec<IrError>,
    },
    /// Live job limit reached.
    #[error("queue full: {0} live jobs")]
    QueueFull(usize),
    /// Configuration failed validation.
    #[error("config invalid: {0}")]
    InvalidConfig(String),
    /// Pool contract violation.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// IR contract violation.
    #[error(transparent)]
    Ir(#[from] IrError),
    /// Queue contract violation.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SchedulerError {
    /// Whether the condition clears by itself once other jobs finish.
    ///
    /// Recoverable errors leave the job `Pending` for a later retry; every
    /// other variant is a caller contract violation.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientUnits { .. }
                | Self::ResourceConflict { .. }
                | Self::DependenciesNotMet(_)
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
