//! Multi-policy job scheduler over a relationship-aware unit pool.
//!
//! The scheduler owns the pool, the queue and the logical clock. A job moves
//! `Pending -> Scheduled -> Running -> Completed | Failed`:
//!
//! - [`Scheduler::admit`] takes all units a job needs or none of them, and
//!   relates every pair it took.
//! - [`Scheduler::begin`] hands the job to the backend side.
//! - [`Scheduler::finish`] records the outcome, advances the clock by the
//!   run's duration, then clears relationships and releases each unit.
//!
//! [`Scheduler::execute`] chains `begin`, one backend call and `finish`.
//! Callers that want several jobs logically Running at once drive `begin`
//! and `finish` themselves.
//!
//! Resource shortage and unit conflicts are recoverable: the job stays
//! Pending and is picked up by a later call. Everything else is returned to
//! the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::audit::{AuditAction, AuditEvent, AuditSink};
use crate::core::backend::{ExecutionBackend, ExecutionOutcome};
use crate::core::block::OperationBlock;
use crate::core::job::{Job, JobState, JobSubmission, JobView};
use crate::core::job_queue::{JobQueue, QueueStats};
use crate::core::resource_pool::{PoolStats, ResourcePool};
use crate::core::{BackendError, PoolError, QueueError, SchedulerError};
use crate::util::clock::{LogicalClock, Timestamp};
use crate::util::serde::{JobId, UnitId, UnitIndex};

/// Weight of the advisory score in the blended selection score.
///
/// `blended = (1 - ADVISORY_WEIGHT) * rule + ADVISORY_WEIGHT * advisory`,
/// where `rule` is the job priority scaled into `[0, 1]`. Adjacent priority
/// levels are `0.75 / 3 = 0.25` apart after weighting, so an advisory score
/// can at most tie a job with the next priority level up, never pass it.
pub const ADVISORY_WEIGHT: f64 = 0.25;

/// How the next job is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Earliest submission first.
    Fifo,
    /// Highest priority first, FIFO among equals.
    #[default]
    Priority,
    /// Highest priority among jobs that fit in the free units right now.
    ResourceAware,
}

/// Optional collaborator nudging Priority and `ResourceAware` selection.
pub trait AdvisoryScorer: Send + Sync {
    /// Score in `[0, 1]`; anything else is ignored.
    fn score(&self, job: &JobView, now: Timestamp) -> f64;
}

impl<F> AdvisoryScorer for F
where
    F: Fn(&JobView, Timestamp) -> f64 + Send + Sync,
{
    fn score(&self, job: &JobView, now: Timestamp) -> f64 {
        self(job, now)
    }
}

/// Pool occupancy for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Units owned by the pool.
    pub total: usize,
    /// Units available.
    pub free: usize,
    /// Units held by jobs.
    pub used: usize,
    /// `used / total`, `0.0` for an empty pool.
    pub usage_rate: f64,
}

/// Result of running one job to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Job id.
    pub job_id: JobId,
    /// `Completed` or `Failed`.
    pub state: JobState,
    /// Units the job held.
    pub units: Vec<UnitId>,
    /// Ticks the clock advanced by.
    pub duration: u64,
    /// Backend results.
    pub measurement_results: Vec<bool>,
    /// Whether the inverse block ran before release.
    pub compensated: bool,
    /// Backend failure message.
    pub failure_reason: Option<String>,
}

/// What one `schedule_and_execute_next` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    /// Nothing eligible to run.
    Idle,
    /// The selected job could not be admitted yet and stays Pending.
    Deferred {
        /// Selected job.
        job: JobId,
        /// Why admission failed.
        reason: SchedulerError,
    },
    /// A job ran to a terminal state.
    Executed(JobReport),
}

/// Shared audit sink handle.
pub type SharedAuditSink = Arc<Mutex<dyn AuditSink>>;

/// Single-controller scheduler.
pub struct Scheduler<B: ExecutionBackend> {
    pool: ResourcePool,
    queue: JobQueue,
    policy: SchedulingPolicy,
    backend: B,
    clock: LogicalClock,
    scorer: Option<Box<dyn AdvisoryScorer>>,
    audit: Option<SharedAuditSink>,
    max_live_jobs: usize,
}

impl<B: ExecutionBackend> Scheduler<B> {
    /// Scheduler over a fresh pool of `unit_count` units.
    pub fn new(unit_count: usize, policy: SchedulingPolicy, backend: B) -> Self {
        Self {
            pool: ResourcePool::initialize(unit_count),
            queue: JobQueue::new(),
            policy,
            backend,
            clock: LogicalClock::new(),
            scorer: None,
            audit: None,
            max_live_jobs: usize::MAX,
        }
    }

    /// Attach an advisory scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl AdvisoryScorer + 'static) -> Self {
        self.scorer = Some(Box::new(scorer));
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Bound the number of non-terminal jobs.
    #[must_use]
    pub fn with_max_live_jobs(mut self, max_live_jobs: usize) -> Self {
        self.max_live_jobs = max_live_jobs;
        self
    }

    /// Bound the number of archived terminal jobs. See
    /// [`JobQueue::set_archive_capacity`].
    #[must_use]
    pub fn with_archive_capacity(mut self, capacity: usize) -> Self {
        self.queue.set_archive_capacity(Some(capacity));
        self
    }

    /// Active policy.
    pub const fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Switch policy. Takes effect at the next selection.
    pub fn set_policy(&mut self, policy: SchedulingPolicy) {
        self.policy = policy;
    }

    /// The unit pool.
    pub const fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// The job queue.
    pub const fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// The execution backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Current logical time.
    pub const fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Look up a live or archived job.
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.queue.get(id)
    }

    /// Queue counters.
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Pool occupancy with usage rate.
    pub fn resource_usage(&self) -> ResourceUsage {
        let PoolStats {
            total,
            free,
            allocated,
        } = self.pool.stats();
        #[allow(clippy::cast_precision_loss)]
        let usage_rate = if total == 0 {
            0.0
        } else {
            allocated as f64 / total as f64
        };
        ResourceUsage {
            total,
            free,
            used: allocated,
            usage_rate,
        }
    }

    /// Validate and enqueue a job.
    ///
    /// Rejects blocks touching no units, blocks needing more units than the
    /// pool owns, and blocks with structural violations. Block-local unit
    /// indices must lie below the pool size.
    pub fn submit(&mut self, submission: JobSubmission) -> Result<JobId, SchedulerError> {
        let block = &submission.block;
        if block.unit_ids().is_empty() {
            return Err(SchedulerError::EmptyBlock(block.name().to_string()));
        }
        let total = self.pool.total();
        if block.cost().unit_count > total {
            return Err(SchedulerError::ExceedsCapacity {
                requested: block.cost().unit_count,
                total,
            });
        }
        let max_index = UnitIndex::try_from(total - 1).unwrap_or(UnitIndex::MAX);
        let violations = block.validate(max_index);
        if !violations.is_empty() {
            return Err(SchedulerError::InvalidBlock {
                name: block.name().to_string(),
                violations,
            });
        }
        if self.queue.live_len() >= self.max_live_jobs {
            return Err(SchedulerError::QueueFull(self.max_live_jobs));
        }
        let id = self.queue.enqueue(submission, self.clock.now())?;
        tracing::info!(job_id = id, clock = self.clock.now(), "job submitted");
        self.audit(id, AuditAction::Submit, None);
        Ok(id)
    }

    /// Make `job` wait for `depends_on` to complete.
    pub fn set_dependency(&mut self, job: JobId, depends_on: JobId) -> Result<(), SchedulerError> {
        Ok(self.queue.set_dependency(job, depends_on)?)
    }

    /// Whether every dependency of `job` has completed.
    pub fn can_execute(&self, job: JobId) -> Result<bool, SchedulerError> {
        Ok(self.queue.can_execute(job)?)
    }

    /// Pick the next Pending job under the active policy.
    ///
    /// Only jobs whose dependencies have completed are considered.
    pub fn select_next(&self) -> Option<JobId> {
        let ready = |job: &Job| self.queue.dependencies_met(job);
        match self.policy {
            SchedulingPolicy::Fifo => self.queue.earliest_submitted_where(ready).map(Job::id),
            SchedulingPolicy::Priority => self.best_scored(ready),
            SchedulingPolicy::ResourceAware => {
                let free = self.pool.free_count();
                self.best_scored(|job| job.units_required() <= free && ready(job))
            }
        }
    }

    /// True iff a Scheduled or Running job holds any of `candidates`.
    pub fn check_conflict(&self, candidates: &[UnitId]) -> bool {
        self.conflicting_holder(candidates).is_some()
    }

    /// Allocate every unit the job needs, relate them pairwise and move the
    /// job to Scheduled. On any failure every unit taken here is returned.
    pub fn admit(&mut self, id: JobId) -> Result<Vec<UnitId>, SchedulerError> {
        let job = self.queue.job(id)?;
        if job.state() != JobState::Pending {
            return Err(QueueError::InvalidTransition {
                job: id,
                from: job.state(),
                to: JobState::Scheduled,
            }
            .into());
        }
        if !self.queue.dependencies_met(job) {
            return Err(SchedulerError::DependenciesNotMet(id));
        }
        let requested = job.units_required();
        let candidates = self.pool.peek_free(requested);
        if candidates.len() < requested {
            return Err(SchedulerError::InsufficientUnits {
                requested,
                available: candidates.len(),
            });
        }
        if let Some((holder, units)) = self.conflicting_holder(&candidates) {
            return Err(SchedulerError::ResourceConflict { holder, units });
        }

        let mut taken = Vec::with_capacity(requested);
        for _ in 0..requested {
            match self.pool.allocate() {
                Ok(unit) => taken.push(unit),
                Err(err) => {
                    self.roll_back(&taken);
                    return Err(match err {
                        PoolError::ExhaustedPool => SchedulerError::InsufficientUnits {
                            requested,
                            available: taken.len(),
                        },
                        other => other.into(),
                    });
                }
            }
        }
        if let Err(err) = self.relate_pairwise(&taken) {
            self.roll_back(&taken);
            return Err(err.into());
        }
        if let Err(err) = self.queue.mark_scheduled(id, taken.clone(), self.clock.now()) {
            self.roll_back(&taken);
            return Err(err.into());
        }
        tracing::info!(job_id = id, units = ?taken, clock = self.clock.now(), "job admitted");
        self.audit(id, AuditAction::Admit, Some(format!("units {taken:?}")));
        Ok(taken)
    }

    /// `Scheduled -> Running`, recording per-unit operation counts.
    pub fn begin(&mut self, id: JobId) -> Result<(), SchedulerError> {
        self.queue.update_state(id, JobState::Running)?;
        let job = self.queue.job(id)?;
        let block = Arc::clone(job.block());
        let units = job.allocated_units().to_vec();
        self.record_block_operations(&block, &units)?;
        tracing::info!(job_id = id, units = ?units, "job started");
        self.audit(id, AuditAction::Start, None);
        Ok(())
    }

    /// Record the backend result for a Running job, advance the clock and
    /// release its units.
    ///
    /// A backend error fails the job; it is not an error of this call.
    pub fn finish(
        &mut self,
        id: JobId,
        result: Result<ExecutionOutcome, BackendError>,
    ) -> Result<JobReport, SchedulerError> {
        self.finish_with(id, result, false)
    }

    /// Run a Scheduled job to a terminal state with one backend call.
    pub fn execute(&mut self, id: JobId) -> Result<JobReport, SchedulerError> {
        self.begin(id)?;
        let job = self.queue.job(id)?;
        let result = self.backend.run(job.block(), job.allocated_units());
        self.finish(id, result)
    }

    /// Run a Scheduled job, then run its inverse on the same units before
    /// release. Irreversible blocks get a plain [`Scheduler::execute`].
    ///
    /// The clock advances by forward plus inverse duration. A failed forward
    /// run skips compensation.
    pub fn execute_with_automatic_compensation(
        &mut self,
        id: JobId,
    ) -> Result<JobReport, SchedulerError> {
        let job = self.queue.job(id)?;
        if !job.block().is_reversible() {
            return self.execute(id);
        }
        let inverse = job.block().generate_inverse()?;
        let forward_estimate = job.estimated_duration();

        self.begin(id)?;
        let job = self.queue.job(id)?;
        let units = job.allocated_units().to_vec();
        let forward = match self.backend.run(job.block(), &units) {
            Ok(outcome) => outcome,
            Err(err) => return self.finish(id, Err(err)),
        };

        self.settle_units(&units)?;
        self.record_block_operations(&inverse, &units)?;
        tracing::info!(job_id = id, inverse = inverse.name(), "running compensation");
        self.audit(id, AuditAction::Compensate, Some(inverse.name().to_string()));
        let result = self.backend.run(&inverse, &units).map(|undo| {
            let duration = forward.actual_duration.unwrap_or(forward_estimate)
                + undo.actual_duration.unwrap_or(inverse.cost().depth_estimate);
            ExecutionOutcome {
                measurement_results: forward.measurement_results,
                actual_duration: Some(duration),
            }
        });
        self.finish_with(id, result, true)
    }

    /// Select, admit and execute one job.
    ///
    /// Recoverable admission failures leave the job Pending and are
    /// reported as [`ScheduleOutcome::Deferred`].
    pub fn schedule_and_execute_next(&mut self) -> Result<ScheduleOutcome, SchedulerError> {
        let Some(id) = self.select_next() else {
            return Ok(ScheduleOutcome::Idle);
        };
        match self.admit(id) {
            Ok(_) => Ok(ScheduleOutcome::Executed(self.execute(id)?)),
            Err(reason) if reason.is_recoverable() => {
                tracing::warn!(job_id = id, %reason, "admission deferred");
                self.audit(id, AuditAction::Defer, Some(reason.to_string()));
                Ok(ScheduleOutcome::Deferred { job: id, reason })
            }
            Err(err) => Err(err),
        }
    }

    /// Call [`Scheduler::schedule_and_execute_next`] until it stops making
    /// progress. Returns the reports of every job that ran.
    pub fn run_until_idle(&mut self) -> Result<Vec<JobReport>, SchedulerError> {
        let mut reports = Vec::new();
        while let ScheduleOutcome::Executed(report) = self.schedule_and_execute_next()? {
            reports.push(report);
        }
        Ok(reports)
    }

    fn finish_with(
        &mut self,
        id: JobId,
        result: Result<ExecutionOutcome, BackendError>,
        compensated: bool,
    ) -> Result<JobReport, SchedulerError> {
        let job = self.queue.job(id)?;
        if job.state() != JobState::Running {
            return Err(QueueError::InvalidTransition {
                job: id,
                from: job.state(),
                to: if result.is_ok() {
                    JobState::Completed
                } else {
                    JobState::Failed
                },
            }
            .into());
        }
        let estimated = job.estimated_duration();
        let units = job.allocated_units().to_vec();

        let report = match result {
            Ok(outcome) => {
                let duration = outcome.actual_duration.unwrap_or(estimated);
                let now = self.clock.advance(duration);
                let results = outcome.measurement_results;
                self.queue.mark_completed(id, duration, results.clone(), now)?;
                tracing::info!(job_id = id, duration, clock = now, "job completed");
                self.audit(id, AuditAction::Complete, None);
                JobReport {
                    job_id: id,
                    state: JobState::Completed,
                    units: units.clone(),
                    duration,
                    measurement_results: results,
                    compensated,
                    failure_reason: None,
                }
            }
            Err(err) => {
                let now = self.clock.advance(estimated);
                let reason = err.to_string();
                self.queue.mark_failed(id, estimated, reason.clone(), now)?;
                tracing::warn!(job_id = id, %reason, clock = now, "job failed");
                self.audit(id, AuditAction::Fail, Some(reason.clone()));
                JobReport {
                    job_id: id,
                    state: JobState::Failed,
                    units: units.clone(),
                    duration: estimated,
                    measurement_results: Vec::new(),
                    compensated: false,
                    failure_reason: Some(reason),
                }
            }
        };

        self.settle_units(&units)?;
        for unit in units {
            self.pool.clear_relationships(unit)?;
            self.pool.release(unit)?;
        }
        Ok(report)
    }

    /// `InUse -> Allocated` for every unit once a backend run has returned.
    fn settle_units(&mut self, units: &[UnitId]) -> Result<(), PoolError> {
        for &unit in units {
            self.pool.mark_idle(unit)?;
        }
        Ok(())
    }

    fn best_scored(&self, eligible: impl Fn(&Job) -> bool) -> Option<JobId> {
        let Some(scorer) = self.scorer.as_deref() else {
            return self.queue.highest_priority_where(eligible).map(Job::id);
        };
        let now = self.clock.now();
        let mut best: Option<(JobId, f64)> = None;
        for job in self.queue.pending().filter(|&j| eligible(j)) {
            let score = blended_score(job, scorer, now);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((job.id(), score));
            }
        }
        best.map(|(id, _)| id)
    }

    fn conflicting_holder(&self, candidates: &[UnitId]) -> Option<(JobId, Vec<UnitId>)> {
        self.queue.active().find_map(|job| {
            let overlap: Vec<UnitId> = candidates
                .iter()
                .copied()
                .filter(|u| job.allocated_units().contains(u))
                .collect();
            (!overlap.is_empty()).then(|| (job.id(), overlap))
        })
    }

    fn relate_pairwise(&mut self, units: &[UnitId]) -> Result<(), PoolError> {
        for (i, &a) in units.iter().enumerate() {
            for &b in &units[i + 1..] {
                self.pool.record_relationship(a, b)?;
            }
        }
        Ok(())
    }

    fn roll_back(&mut self, units: &[UnitId]) {
        for &unit in units {
            let undone = self
                .pool
                .clear_relationships(unit)
                .and_then(|_| self.pool.release(unit));
            if let Err(err) = undone {
                tracing::error!(unit_id = unit, %err, "rollback failed to release unit");
            }
        }
        tracing::debug!(units = ?units, "admission rolled back");
    }

    fn record_block_operations(
        &mut self,
        block: &OperationBlock,
        units: &[UnitId],
    ) -> Result<(), PoolError> {
        let binding: BTreeMap<UnitIndex, UnitId> =
            block.unit_ids().iter().copied().zip(units.iter().copied()).collect();
        for (local, count) in block.operations_per_unit() {
            if let Some(&unit) = binding.get(&local) {
                self.pool.record_operations(unit, count)?;
            }
        }
        Ok(())
    }

    fn audit(&self, job: JobId, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.lock()
                .record(AuditEvent::new(job, action, self.clock.now(), detail));
        }
    }
}

/// Rule score blended with the advisory score; the rule score alone when
/// the advisory one is not a finite value in `[0, 1]`.
fn blended_score(job: &Job, scorer: &dyn AdvisoryScorer, now: Timestamp) -> f64 {
    let rule = job.priority().normalized();
    let advisory = scorer.score(&job.view(), now);
    if advisory.is_finite() && (0.0..=1.0).contains(&advisory) {
        (1.0 - ADVISORY_WEIGHT).mul_add(rule, ADVISORY_WEIGHT * advisory)
    } else {
        tracing::warn!(job_id = job.id(), advisory, "advisory score out of range, ignored");
        rule
    }
}
