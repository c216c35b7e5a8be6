//! Tests for runtime API models

use prometheus_hybrid_scheduler::core::{
    bell_pair, measure_all, JobState, JobSubmission, Scheduler, SchedulingPolicy, SimulatedBackend,
};
use prometheus_hybrid_scheduler::runtime::{health, job_status, snapshot, JobStatusResponse};
use prometheus_hybrid_scheduler::util::serde::Priority;

fn scheduler() -> Scheduler<SimulatedBackend> {
    Scheduler::new(4, SchedulingPolicy::Priority, SimulatedBackend::new())
}

#[test]
fn test_health() {
    assert!(health().ok);
}

#[test]
fn test_job_status_tracks_lifecycle() {
    let mut s = scheduler();
    let id = s
        .submit(JobSubmission::new("bell", bell_pair()).with_priority(Priority::High))
        .unwrap();
    let pending = job_status(&s, id).unwrap();
    assert_eq!(pending.state, JobState::Pending);
    assert!(pending.allocated_units.is_empty());

    s.run_until_idle().unwrap();
    let done = job_status(&s, id).unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.allocated_units, vec![0, 1]);
    assert_eq!(done.actual_duration, Some(2));
    assert_eq!(done.completed_at, Some(2));
}

#[test]
fn test_job_status_unknown() {
    assert!(job_status(&scheduler(), 42).is_none());
}

#[test]
fn test_failed_job_status_has_reason() {
    let backend = SimulatedBackend::new().failing_on("measure_1");
    let mut s = Scheduler::new(1, SchedulingPolicy::Fifo, backend);
    let id = s.submit(JobSubmission::new("m", measure_all(1))).unwrap();
    s.run_until_idle().unwrap();
    let status = job_status(&s, id).unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.reason.unwrap().contains("measure_1"));
}

#[test]
fn test_status_response_json_shape() {
    let mut s = scheduler();
    let id = s.submit(JobSubmission::new("bell", bell_pair())).unwrap();
    let json = serde_json::to_value(job_status(&s, id).unwrap()).unwrap();
    assert_eq!(json["state"], "pending");
    assert_eq!(json["priority"], "normal");
    let back: JobStatusResponse = serde_json::from_value(json).unwrap();
    assert_eq!(back.job_id, id);
}

#[test]
fn test_snapshot_counts() {
    let mut s = scheduler();
    let id = s.submit(JobSubmission::new("bell", bell_pair())).unwrap();
    s.admit(id).unwrap();
    let snap = snapshot(&s);
    assert_eq!(snap.pool.allocated, 2);
    assert_eq!(snap.usage.used, 2);
    assert_eq!(snap.queue.scheduled, 1);
    assert_eq!(snap.clock, 0);
}
