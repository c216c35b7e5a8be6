//! Job queue with per-state counters and dependency gating.
//!
//! Live jobs are kept in a [`BTreeMap`] keyed by id. Ids are handed out in
//! increasing order, so iterating the map visits jobs in enqueue order and a
//! "first encountered wins" scan gives FIFO tie-breaking for free. Jobs that
//! reach a terminal state move to an archive, where they stay available for
//! dependency checks and status lookups.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::job::{Job, JobState, JobSubmission};
use crate::core::QueueError;
use crate::util::clock::Timestamp;
use crate::util::serde::{JobId, UnitId};

/// Job counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Waiting for admission.
    pub pending: usize,
    /// Admitted, not started.
    pub scheduled: usize,
    /// Running.
    pub running: usize,
    /// Completed.
    pub completed: usize,
    /// Failed.
    pub failed: usize,
    /// Every job ever enqueued.
    pub total: usize,
}

/// Owner of every job record.
#[derive(Debug, Clone)]
pub struct JobQueue {
    live: BTreeMap<JobId, Job>,
    archive: BTreeMap<JobId, Job>,
    archive_capacity: Option<usize>,
    counts: [usize; JobState::ALL.len()],
    next_job_id: JobId,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    /// Empty queue. The first job gets id 1.
    pub const fn new() -> Self {
        Self {
            live: BTreeMap::new(),
            archive: BTreeMap::new(),
            archive_capacity: None,
            counts: [0; JobState::ALL.len()],
            next_job_id: 1,
        }
    }

    /// Keep at most `capacity` terminal jobs, evicting the oldest first.
    ///
    /// Jobs still named as a dependency by a live job are never evicted, so
    /// the archive may exceed the cap while such references remain. `None`
    /// keeps every terminal job.
    pub fn set_archive_capacity(&mut self, capacity: Option<usize>) {
        self.archive_capacity = capacity;
        self.prune_archive();
    }

    /// Number of archived terminal jobs.
    pub fn archive_len(&self) -> usize {
        self.archive.len()
    }

    /// Create a Pending job from `submission` and assign it the next id.
    ///
    /// Every listed dependency must already be known to the queue.
    pub fn enqueue(
        &mut self,
        submission: JobSubmission,
        now: Timestamp,
    ) -> Result<JobId, QueueError> {
        if let Some(&missing) = submission.depends_on.iter().find(|d| self.get(**d).is_none()) {
            return Err(QueueError::UnknownJob(missing));
        }
        let id = self.next_job_id;
        self.next_job_id += 1;
        let job = Job::from_submission(id, submission, now);
        tracing::debug!(job_id = id, priority = ?job.priority(), "job enqueued");
        self.counts[JobState::Pending.index()] += 1;
        self.live.insert(id, job);
        Ok(id)
    }

    /// Number of non-terminal jobs.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Whether no job is live.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Id the next enqueued job will receive.
    pub const fn next_job_id(&self) -> JobId {
        self.next_job_id
    }

    /// Look up a live or archived job.
    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.live.get(&id).or_else(|| self.archive.get(&id))
    }

    /// Like [`JobQueue::get`], failing with `UnknownJob`.
    pub fn job(&self, id: JobId) -> Result<&Job, QueueError> {
        self.get(id).ok_or(QueueError::UnknownJob(id))
    }

    /// Every job, live ones first, each group in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.live.values().chain(self.archive.values())
    }

    /// Pending jobs in enqueue order.
    pub fn pending(&self) -> impl Iterator<Item = &Job> {
        self.live.values().filter(|j| j.state() == JobState::Pending)
    }

    /// Scheduled and Running jobs.
    pub fn active(&self) -> impl Iterator<Item = &Job> {
        self.live.values().filter(|j| j.state().is_active())
    }

    /// The Pending job with the strictly greatest priority, earliest
    /// enqueued on ties. Selection only; the job stays in the queue until
    /// its state changes.
    pub fn dequeue_highest_priority(&self) -> Option<&Job> {
        self.highest_priority_where(|_| true)
    }

    /// [`JobQueue::dequeue_highest_priority`] restricted to jobs accepted by
    /// `eligible`.
    pub fn highest_priority_where(&self, eligible: impl Fn(&Job) -> bool) -> Option<&Job> {
        let mut best: Option<&Job> = None;
        for job in self.pending().filter(|&j| eligible(j)) {
            if best.is_none_or(|b| job.priority() > b.priority()) {
                best = Some(job);
            }
        }
        best
    }

    /// The eligible Pending job with the earliest submission time, earliest
    /// enqueued on ties.
    pub fn earliest_submitted_where(&self, eligible: impl Fn(&Job) -> bool) -> Option<&Job> {
        let mut best: Option<&Job> = None;
        for job in self.pending().filter(|&j| eligible(j)) {
            if best.is_none_or(|b| job.submitted_at() < b.submitted_at()) {
                best = Some(job);
            }
        }
        best
    }

    /// Move a job along one edge of the state machine.
    ///
    /// `Scheduled` needs allocated units, so admission goes through
    /// [`JobQueue::mark_scheduled`]; asking for it here is rejected.
    pub fn update_state(&mut self, id: JobId, to: JobState) -> Result<(), QueueError> {
        if to == JobState::Scheduled {
            let from = self.job(id)?.state();
            return Err(QueueError::InvalidTransition { job: id, from, to });
        }
        self.transition(id, to, |_| {})
    }

    /// `Pending -> Scheduled`, recording the units the job now holds.
    pub fn mark_scheduled(
        &mut self,
        id: JobId,
        units: Vec<UnitId>,
        at: Timestamp,
    ) -> Result<(), QueueError> {
        if units.is_empty() {
            let from = self.job(id)?.state();
            return Err(QueueError::InvalidTransition {
                job: id,
                from,
                to: JobState::Scheduled,
            });
        }
        self.transition(id, JobState::Scheduled, move |job| {
            job.allocated_units = units;
            job.scheduled_at = Some(at);
        })
    }

    /// `Running -> Completed` with the backend's results.
    pub fn mark_completed(
        &mut self,
        id: JobId,
        duration: u64,
        measurement_results: Vec<bool>,
        at: Timestamp,
    ) -> Result<(), QueueError> {
        self.transition(id, JobState::Completed, move |job| {
            job.actual_duration = Some(duration);
            job.measurement_results = measurement_results;
            job.completed_at = Some(at);
        })
    }

    /// `Running -> Failed` with the backend's reason.
    pub fn mark_failed(
        &mut self,
        id: JobId,
        duration: u64,
        reason: String,
        at: Timestamp,
    ) -> Result<(), QueueError> {
        self.transition(id, JobState::Failed, move |job| {
            job.actual_duration = Some(duration);
            job.failure_reason = Some(reason);
            job.completed_at = Some(at);
        })
    }

    /// Make `id` wait for `depends_on` to complete.
    ///
    /// Self-edges and edges closing a cycle are rejected. Only Pending jobs
    /// can gain dependencies; admission is where they are enforced.
    pub fn set_dependency(&mut self, id: JobId, depends_on: JobId) -> Result<(), QueueError> {
        self.job(depends_on)?;
        let state = self.job(id)?.state();
        if state != JobState::Pending {
            return Err(QueueError::InvalidTransition {
                job: id,
                from: state,
                to: JobState::Pending,
            });
        }
        if id == depends_on || self.reaches(depends_on, id) {
            return Err(QueueError::CyclicDependency(id));
        }
        if let Some(job) = self.live.get_mut(&id) {
            if let Err(pos) = job.depends_on.binary_search(&depends_on) {
                job.depends_on.insert(pos, depends_on);
            }
        }
        Ok(())
    }

    /// True iff every dependency of the job is Completed.
    pub fn can_execute(&self, id: JobId) -> Result<bool, QueueError> {
        Ok(self.dependencies_met(self.job(id)?))
    }

    /// Dependency check for a job already in hand.
    pub fn dependencies_met(&self, job: &Job) -> bool {
        job.depends_on()
            .iter()
            .all(|d| self.get(*d).is_some_and(|dep| dep.state() == JobState::Completed))
    }

    /// Counts per state plus total.
    pub fn stats(&self) -> QueueStats {
        let [pending, scheduled, running, completed, failed] = self.counts;
        QueueStats {
            pending,
            scheduled,
            running,
            completed,
            failed,
            total: self.counts.iter().sum(),
        }
    }

    fn transition(
        &mut self,
        id: JobId,
        to: JobState,
        apply: impl FnOnce(&mut Job),
    ) -> Result<(), QueueError> {
        let Some(job) = self.live.get_mut(&id) else {
            return Err(match self.archive.get(&id) {
                Some(done) => QueueError::InvalidTransition {
                    job: id,
                    from: done.state(),
                    to,
                },
                None => QueueError::UnknownJob(id),
            });
        };
        let from = job.state;
        if !from.can_transition_to(to) {
            return Err(QueueError::InvalidTransition { job: id, from, to });
        }
        apply(job);
        job.state = to;
        self.counts[from.index()] -= 1;
        self.counts[to.index()] += 1;
        tracing::debug!(job_id = id, ?from, ?to, "job state changed");
        if to.is_terminal() {
            if let Some(done) = self.live.remove(&id) {
                self.archive.insert(id, done);
            }
            self.prune_archive();
        }
        Ok(())
    }

    fn prune_archive(&mut self) {
        let Some(capacity) = self.archive_capacity else {
            return;
        };
        let Some(excess) = self.archive.len().checked_sub(capacity).filter(|n| *n > 0) else {
            return;
        };
        let referenced: BTreeSet<JobId> = self
            .live
            .values()
            .flat_map(|job| job.depends_on().iter().copied())
            .collect();
        let evict: Vec<JobId> = self
            .archive
            .keys()
            .copied()
            .filter(|id| !referenced.contains(id))
            .take(excess)
            .collect();
        for id in &evict {
            self.archive.remove(id);
        }
        if !evict.is_empty() {
            tracing::debug!(evicted = evict.len(), retained = self.archive.len(), "archive trimmed");
        }
    }

    /// Whether `to` is reachable from `from` along dependency edges.
    fn reaches(&self, from: JobId, to: JobId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(job) = self.get(current) {
                stack.extend(job.depends_on().iter().copied());
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::ghz;
    use crate::util::serde::Priority;

    fn submit(queue: &mut JobQueue, name: &str, priority: Priority, now: Timestamp) -> JobId {
        queue
            .enqueue(JobSubmission::new(name, ghz(2)).with_priority(priority), now)
            .unwrap()
    }

    fn run_to_completion(queue: &mut JobQueue, id: JobId) {
        queue.mark_scheduled(id, vec![0, 1], 0).unwrap();
        queue.update_state(id, JobState::Running).unwrap();
        queue.mark_completed(id, 2, vec![false, false], 2).unwrap();
    }

    #[test]
    fn test_enqueue_assigns_increasing_ids() {
        let mut queue = JobQueue::new();
        assert_eq!(submit(&mut queue, "a", Priority::Low, 0), 1);
        assert_eq!(submit(&mut queue, "b", Priority::Low, 0), 2);
        assert_eq!(queue.next_job_id(), 3);
        assert_eq!(queue.stats().pending, 2);
        assert_eq!(queue.stats().total, 2);
    }

    #[test]
    fn test_highest_priority_with_fifo_ties() {
        let mut queue = JobQueue::new();
        submit(&mut queue, "low", Priority::Low, 0);
        let first_high = submit(&mut queue, "high-1", Priority::High, 1);
        submit(&mut queue, "high-2", Priority::High, 2);
        submit(&mut queue, "normal", Priority::Normal, 3);
        assert_eq!(queue.dequeue_highest_priority().unwrap().id(), first_high);
    }

    #[test]
    fn test_selection_does_not_remove() {
        let mut queue = JobQueue::new();
        let id = submit(&mut queue, "a", Priority::Normal, 0);
        assert_eq!(queue.dequeue_highest_priority().unwrap().id(), id);
        assert_eq!(queue.dequeue_highest_priority().unwrap().id(), id);
        assert_eq!(queue.stats().pending, 1);
    }

    #[test]
    fn test_empty_queue_selects_nothing() {
        let queue = JobQueue::new();
        assert!(queue.dequeue_highest_priority().is_none());
        assert!(queue.earliest_submitted_where(|_| true).is_none());
    }

    #[test]
    fn test_lifecycle_counters_and_archive() {
        let mut queue = JobQueue::new();
        let id = submit(&mut queue, "a", Priority::Normal, 0);
        run_to_completion(&mut queue, id);
        let stats = queue.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total, 1);
        assert!(queue.is_empty());
        let job = queue.get(id).unwrap();
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.actual_duration(), Some(2));
    }

    #[test]
    fn test_invalid_transitions_leave_state_unchanged() {
        let mut queue = JobQueue::new();
        let id = submit(&mut queue, "a", Priority::Normal, 0);
        assert_eq!(
            queue.update_state(id, JobState::Running),
            Err(QueueError::InvalidTransition {
                job: id,
                from: JobState::Pending,
                to: JobState::Running
            })
        );
        assert!(queue.update_state(id, JobState::Scheduled).is_err());
        assert!(queue.mark_scheduled(id, Vec::new(), 0).is_err());
        assert_eq!(queue.get(id).unwrap().state(), JobState::Pending);
        assert_eq!(queue.stats().pending, 1);

        run_to_completion(&mut queue, id);
        assert_eq!(
            queue.update_state(id, JobState::Running),
            Err(QueueError::InvalidTransition {
                job: id,
                from: JobState::Completed,
                to: JobState::Running
            })
        );
        assert_eq!(queue.update_state(99, JobState::Running), Err(QueueError::UnknownJob(99)));
    }

    #[test]
    fn test_failed_job_records_reason() {
        let mut queue = JobQueue::new();
        let id = submit(&mut queue, "a", Priority::Normal, 0);
        queue.mark_scheduled(id, vec![3], 1).unwrap();
        queue.update_state(id, JobState::Running).unwrap();
        queue.mark_failed(id, 4, "calibration drift".into(), 5).unwrap();
        let job = queue.get(id).unwrap();
        assert_eq!(job.failure_reason(), Some("calibration drift"));
        assert_eq!(job.allocated_units(), &[3]);
        assert_eq!(queue.stats().failed, 1);
    }

    #[test]
    fn test_dependencies_gate_execution() {
        let mut queue = JobQueue::new();
        let a = submit(&mut queue, "a", Priority::Normal, 0);
        let b = submit(&mut queue, "b", Priority::Critical, 0);
        queue.set_dependency(b, a).unwrap();
        assert!(!queue.can_execute(b).unwrap());
        assert!(queue.can_execute(a).unwrap());
        let ready = queue.highest_priority_where(|j| queue.dependencies_met(j)).unwrap();
        assert_eq!(ready.id(), a);
        run_to_completion(&mut queue, a);
        assert!(queue.can_execute(b).unwrap());
    }

    #[test]
    fn test_cyclic_dependencies_rejected() {
        let mut queue = JobQueue::new();
        let a = submit(&mut queue, "a", Priority::Normal, 0);
        let b = submit(&mut queue, "b", Priority::Normal, 0);
        let c = submit(&mut queue, "c", Priority::Normal, 0);
        assert_eq!(queue.set_dependency(a, a), Err(QueueError::CyclicDependency(a)));
        queue.set_dependency(b, a).unwrap();
        queue.set_dependency(c, b).unwrap();
        assert_eq!(queue.set_dependency(a, c), Err(QueueError::CyclicDependency(a)));
        assert_eq!(queue.set_dependency(a, 42), Err(QueueError::UnknownJob(42)));
    }

    #[test]
    fn test_enqueue_with_unknown_dependency() {
        let mut queue = JobQueue::new();
        let result = queue.enqueue(JobSubmission::new("x", ghz(1)).depends_on(7), 0);
        assert_eq!(result, Err(QueueError::UnknownJob(7)));
        assert_eq!(queue.stats().total, 0);
        assert_eq!(queue.next_job_id(), 1);
    }

    #[test]
    fn test_only_pending_jobs_gain_dependencies() {
        let mut queue = JobQueue::new();
        let first = submit(&mut queue, "first", Priority::Normal, 0);
        let second = submit(&mut queue, "second", Priority::Normal, 0);
        queue.mark_scheduled(second, vec![0, 1], 0).unwrap();
        assert_eq!(
            queue.set_dependency(second, first),
            Err(QueueError::InvalidTransition {
                job: second,
                from: JobState::Scheduled,
                to: JobState::Pending
            })
        );
        queue.update_state(second, JobState::Running).unwrap();
        assert!(queue.set_dependency(second, first).is_err());
        assert!(queue.get(second).unwrap().depends_on().is_empty());
        assert!(queue.can_execute(second).unwrap());
    }

    #[test]
    fn test_archive_capacity_evicts_oldest_unreferenced() {
        let mut queue = JobQueue::new();
        queue.set_archive_capacity(Some(2));
        let ids: Vec<JobId> = (0..4)
            .map(|i| submit(&mut queue, "job", Priority::Normal, i))
            .collect();
        let waiting = queue
            .enqueue(JobSubmission::new("waiting", ghz(2)).depends_on(ids[0]), 5)
            .unwrap();
        for &id in &ids {
            run_to_completion(&mut queue, id);
        }
        // ids[0] is still a live dependency, so it survives over the cap.
        assert_eq!(queue.archive_len(), 2);
        assert!(queue.get(ids[0]).is_some());
        assert!(queue.get(ids[1]).is_none());
        assert!(queue.get(ids[2]).is_none());
        assert!(queue.get(ids[3]).is_some());
        assert!(queue.can_execute(waiting).unwrap());
        assert_eq!(queue.stats().completed, 4);
        assert_eq!(queue.stats().total, 5);

        run_to_completion(&mut queue, waiting);
        assert_eq!(queue.archive_len(), 2);
        assert!(queue.get(ids[0]).is_none());
        assert!(queue.get(waiting).is_some());
    }

    #[test]
    fn test_unbounded_archive_by_default() {
        let mut queue = JobQueue::new();
        for i in 0..10 {
            let id = submit(&mut queue, "job", Priority::Low, i);
            run_to_completion(&mut queue, id);
        }
        assert_eq!(queue.archive_len(), 10);
        queue.set_archive_capacity(Some(3));
        assert_eq!(queue.archive_len(), 3);
        assert!(queue.get(10).is_some());
        assert!(queue.get(7).is_none());
    }

    #[test]
    fn test_earliest_submitted() {
        let mut queue = JobQueue::new();
        submit(&mut queue, "late", Priority::Critical, 9);
        let early = submit(&mut queue, "early", Priority::Low, 3);
        assert_eq!(queue.earliest_submitted_where(|_| true).unwrap().id(), early);
    }
}
