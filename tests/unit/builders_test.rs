//! Tests for builders

use prometheus_hybrid_scheduler::builders::{build_scheduler, build_scheduler_with_audit};
use prometheus_hybrid_scheduler::config::SchedulerConfig;
use prometheus_hybrid_scheduler::core::{
    ghz, AuditAction, JobState, JobSubmission, SchedulerError, SchedulingPolicy, SimulatedBackend,
};

#[test]
fn test_build_scheduler_from_json_config() {
    let cfg = SchedulerConfig::from_json_str(r#"{"unit_count": 5, "policy": "fifo"}"#).unwrap();
    let scheduler = build_scheduler(&cfg, SimulatedBackend::new()).unwrap();
    assert_eq!(scheduler.pool_stats().total, 5);
    assert_eq!(scheduler.policy(), SchedulingPolicy::Fifo);
}

#[test]
fn test_build_scheduler_invalid_config() {
    let cfg = SchedulerConfig::new(4).with_max_live_jobs(0);
    let err = build_scheduler(&cfg, SimulatedBackend::new()).err().unwrap();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    assert!(err.to_string().contains("max_live_jobs"));
}

#[test]
fn test_built_scheduler_runs_jobs_and_audits() {
    let cfg = SchedulerConfig::new(3).with_audit_capacity(32);
    let (mut scheduler, sink) = build_scheduler_with_audit(&cfg, SimulatedBackend::new()).unwrap();
    let id = scheduler.submit(JobSubmission::new("ghz", ghz(3))).unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(scheduler.job(id).unwrap().state(), JobState::Completed);
    let actions = sink.unwrap().lock().actions_for(id);
    assert_eq!(actions.first(), Some(&AuditAction::Submit));
    assert_eq!(actions.last(), Some(&AuditAction::Complete));
}

#[test]
fn test_no_audit_sink_without_capacity() {
    let cfg = SchedulerConfig::new(2);
    let (_, sink) = build_scheduler_with_audit(&cfg, SimulatedBackend::new()).unwrap();
    assert!(sink.is_none());
}
