//! Core scheduling abstractions: unit pool, operation IR, job queue and
//! scheduler.

pub mod audit;
pub mod backend;
pub mod block;
pub mod error;
pub mod job;
pub mod job_queue;
pub mod operation;
pub mod resource_pool;
pub mod scheduler;

pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use backend::{ExecutionBackend, ExecutionOutcome, SimulatedBackend};
pub use block::{bell_pair, ghz, measure_all, BlockItem, NestedBlock, OperationBlock, ResourceCost};
pub use error::{AppResult, BackendError, IrError, PoolError, QueueError, SchedulerError};
pub use job::{Job, JobState, JobSubmission, JobView};
pub use job_queue::{JobQueue, QueueStats};
pub use operation::{Operation, OperationClass, OperationKind};
pub use resource_pool::{PoolStats, ResourcePool, Unit, UnitState};
pub use scheduler::{
    AdvisoryScorer, JobReport, ResourceUsage, ScheduleOutcome, Scheduler, SchedulingPolicy,
    SharedAuditSink, ADVISORY_WEIGHT,
};
