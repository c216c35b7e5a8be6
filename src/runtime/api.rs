//! API-facing request/response models.

use serde::{Deserialize, Serialize};

use crate::core::{
    ExecutionBackend, Job, JobState, JobSubmission, OperationBlock, PoolStats, QueueStats,
    ResourceCost, ResourceUsage, Scheduler, SchedulerError, SchedulingPolicy,
};
use crate::util::clock::Timestamp;
use crate::util::serde::{JobId, Priority, UnitId};

/// Job submission payload as it arrives over an API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job name.
    pub name: String,
    /// Work to run.
    pub block: OperationBlock,
    /// Priority.
    #[serde(default)]
    pub priority: Priority,
    /// Prerequisite jobs.
    #[serde(default)]
    pub depends_on: Vec<JobId>,
    /// Duration estimate override in ticks.
    #[serde(default)]
    pub estimated_duration: Option<u64>,
}

impl From<JobRequest> for JobSubmission {
    fn from(req: JobRequest) -> Self {
        Self {
            name: req.name,
            block: req.block.into(),
            priority: req.priority,
            depends_on: req.depends_on,
            estimated_duration: req.estimated_duration,
        }
    }
}

/// Job status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job id.
    pub job_id: JobId,
    /// Job name.
    pub name: String,
    /// Current state.
    pub state: JobState,
    /// Priority.
    pub priority: Priority,
    /// Cost of the job's block.
    pub cost: ResourceCost,
    /// Units held or last held.
    pub allocated_units: Vec<UnitId>,
    /// Estimated duration in ticks.
    pub estimated_duration: u64,
    /// Measured duration in ticks.
    pub actual_duration: Option<u64>,
    /// Logical submission time.
    pub submitted_at: Timestamp,
    /// Logical completion time.
    pub completed_at: Option<Timestamp>,
    /// Prerequisite jobs.
    pub depends_on: Vec<JobId>,
    /// Backend failure message.
    pub reason: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id(),
            name: job.name().to_string(),
            state: job.state(),
            priority: job.priority(),
            cost: *job.block().cost(),
            allocated_units: job.allocated_units().to_vec(),
            estimated_duration: job.estimated_duration(),
            actual_duration: job.actual_duration(),
            submitted_at: job.submitted_at(),
            completed_at: job.completed_at(),
            depends_on: job.depends_on().to_vec(),
            reason: job.failure_reason().map(str::to_string),
        }
    }
}

/// Point-in-time view of a scheduler for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Logical clock.
    pub clock: Timestamp,
    /// Active policy.
    pub policy: SchedulingPolicy,
    /// Pool counters.
    pub pool: PoolStats,
    /// Occupancy with usage rate.
    pub usage: ResourceUsage,
    /// Queue counters.
    pub queue: QueueStats,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Submit a request and report the new job's status.
pub fn submit_job<B: ExecutionBackend>(
    scheduler: &mut Scheduler<B>,
    req: JobRequest,
) -> Result<JobStatusResponse, SchedulerError> {
    let id = scheduler.submit(req.into())?;
    job_status(scheduler, id).ok_or(SchedulerError::Queue(crate::core::QueueError::UnknownJob(id)))
}

/// Status of one job, live or archived.
pub fn job_status<B: ExecutionBackend>(scheduler: &Scheduler<B>, id: JobId) -> Option<JobStatusResponse> {
    scheduler.job(id).map(JobStatusResponse::from)
}

/// Snapshot of clock, pool and queue.
pub fn snapshot<B: ExecutionBackend>(scheduler: &Scheduler<B>) -> SchedulerSnapshot {
    SchedulerSnapshot {
        clock: scheduler.now(),
        policy: scheduler.policy(),
        pool: scheduler.pool_stats(),
        usage: scheduler.resource_usage(),
        queue: scheduler.stats(),
    }
}

/// Return a health payload.
pub const fn health() -> Health {
    Health { ok: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SimulatedBackend;

    #[test]
    fn test_submit_from_json() {
        let json = r#"{
            "name": "pair",
            "priority": "high",
            "block": {"name": "pair", "items": [
                {"operation": {"kind": "h", "targets": [0]}},
                {"operation": {"kind": "cnot", "targets": [0, 1]}}
            ]}
        }"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        let mut scheduler = Scheduler::new(2, SchedulingPolicy::Priority, SimulatedBackend::new());
        let status = submit_job(&mut scheduler, req).unwrap();
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.priority, Priority::High);
        assert_eq!(status.cost.operation_count, 2);
        assert_eq!(status.cost.unit_count, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut scheduler = Scheduler::new(2, SchedulingPolicy::Fifo, SimulatedBackend::new());
        scheduler
            .submit(JobSubmission::new("bell", crate::core::bell_pair()))
            .unwrap();
        scheduler.run_until_idle().unwrap();
        let snap = snapshot(&scheduler);
        assert_eq!(snap.queue.completed, 1);
        assert_eq!(snap.clock, 2);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["policy"], "fifo");
        assert_eq!(json["pool"]["free"], 2);
    }
}
