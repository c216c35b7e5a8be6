//! Job records and their lifecycle state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::block::{OperationBlock, ResourceCost};
use crate::util::clock::Timestamp;
use crate::util::serde::{JobId, Priority, UnitId};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for admission.
    Pending,
    /// Units allocated, not started.
    Scheduled,
    /// Handed to the execution backend.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with a backend failure. Terminal.
    Failed,
}

impl JobState {
    /// All states in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Scheduled,
        Self::Running,
        Self::Completed,
        Self::Failed,
    ];

    /// Whether `self -> next` is an edge of the state machine.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Scheduled)
                | (Self::Scheduled, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }

    /// Completed or Failed.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Scheduled or Running: the job holds units.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Running)
    }

    /// Position in [`JobState::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// What a caller hands the scheduler.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    /// Human-readable name.
    pub name: String,
    /// Work to run. Shared so one block can back many jobs.
    pub block: Arc<OperationBlock>,
    /// Scheduling priority.
    pub priority: Priority,
    /// Jobs that must complete first.
    pub depends_on: Vec<JobId>,
    /// Override for the duration estimate; defaults to the block depth.
    pub estimated_duration: Option<u64>,
}

impl JobSubmission {
    /// Submission at [`Priority::Normal`] with no dependencies.
    pub fn new(name: impl Into<String>, block: impl Into<Arc<OperationBlock>>) -> Self {
        Self {
            name: name.into(),
            block: block.into(),
            priority: Priority::Normal,
            depends_on: Vec::new(),
            estimated_duration: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a dependency.
    #[must_use]
    pub fn depends_on(mut self, job: JobId) -> Self {
        self.depends_on.push(job);
        self
    }

    /// Override the duration estimate.
    #[must_use]
    pub fn with_estimated_duration(mut self, ticks: u64) -> Self {
        self.estimated_duration = Some(ticks);
        self
    }
}

/// A schedulable unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub(crate) id: JobId,
    pub(crate) name: String,
    pub(crate) block: Arc<OperationBlock>,
    pub(crate) priority: Priority,
    pub(crate) state: JobState,
    pub(crate) allocated_units: Vec<UnitId>,
    pub(crate) estimated_duration: u64,
    pub(crate) actual_duration: Option<u64>,
    pub(crate) created_at: Timestamp,
    pub(crate) submitted_at: Timestamp,
    pub(crate) scheduled_at: Option<Timestamp>,
    pub(crate) completed_at: Option<Timestamp>,
    pub(crate) depends_on: Vec<JobId>,
    pub(crate) measurement_results: Vec<bool>,
    pub(crate) failure_reason: Option<String>,
}

impl Job {
    pub(crate) fn from_submission(id: JobId, submission: JobSubmission, now: Timestamp) -> Self {
        let estimated_duration = submission
            .estimated_duration
            .unwrap_or(submission.block.cost().depth_estimate);
        let mut depends_on = submission.depends_on;
        depends_on.sort_unstable();
        depends_on.dedup();
        Self {
            id,
            name: submission.name,
            block: submission.block,
            priority: submission.priority,
            state: JobState::Pending,
            allocated_units: Vec::new(),
            estimated_duration,
            actual_duration: None,
            created_at: now,
            submitted_at: now,
            scheduled_at: None,
            completed_at: None,
            depends_on,
            measurement_results: Vec::new(),
            failure_reason: None,
        }
    }

    /// Queue-assigned id.
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Name given at submission.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The job's block.
    pub const fn block(&self) -> &Arc<OperationBlock> {
        &self.block
    }

    /// Scheduling priority.
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Units held. Empty while Pending.
    pub fn allocated_units(&self) -> &[UnitId] {
        &self.allocated_units
    }

    /// Units this job needs.
    pub fn units_required(&self) -> usize {
        self.block.cost().unit_count
    }

    /// Expected run time in ticks.
    pub const fn estimated_duration(&self) -> u64 {
        self.estimated_duration
    }

    /// Measured run time in ticks, once finished.
    pub const fn actual_duration(&self) -> Option<u64> {
        self.actual_duration
    }

    /// Logical time the record was created.
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Logical time the job entered the queue.
    pub const fn submitted_at(&self) -> Timestamp {
        self.submitted_at
    }

    /// Logical time of admission.
    pub const fn scheduled_at(&self) -> Option<Timestamp> {
        self.scheduled_at
    }

    /// Logical time the job reached a terminal state.
    pub const fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    /// Jobs that must complete before this one may run.
    pub fn depends_on(&self) -> &[JobId] {
        &self.depends_on
    }

    /// Results reported by the backend.
    pub fn measurement_results(&self) -> &[bool] {
        &self.measurement_results
    }

    /// Backend failure message, if the job failed.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Read-only projection handed to advisory scorers.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            priority: self.priority,
            cost: *self.block.cost(),
            estimated_duration: self.estimated_duration,
            submitted_at: self.submitted_at,
            dependency_count: self.depends_on.len(),
        }
    }
}

/// Scheduling-relevant facts about a job, detached from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    /// Job id.
    pub id: JobId,
    /// Priority.
    pub priority: Priority,
    /// Block cost.
    pub cost: ResourceCost,
    /// Estimated run time in ticks.
    pub estimated_duration: u64,
    /// Logical submission time.
    pub submitted_at: Timestamp,
    /// Number of prerequisite jobs.
    pub dependency_count: usize,
}

impl JobView {
    /// Ticks spent waiting as of `now`.
    pub const fn waited(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.submitted_at)
    }
}
