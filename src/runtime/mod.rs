//! Runtime adapters and API surface.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_backend;

pub use api::{health, job_status, snapshot, submit_job, JobRequest, JobStatusResponse, SchedulerSnapshot};
#[cfg(feature = "tokio-runtime")]
pub use tokio_backend::{AsyncExecutionBackend, TokioBackend};
