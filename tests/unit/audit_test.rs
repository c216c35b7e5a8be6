//! Tests for audit functionality

use prometheus_hybrid_scheduler::core::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    sink.record(AuditEvent::new(1, AuditAction::Submit, 0, None));
    sink.record(AuditEvent::new(2, AuditAction::Defer, 5, Some("insufficient units".into())));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].job_id, 2);
    assert_eq!(events[1].logical_time, 5);
    assert_eq!(events[1].detail.as_deref(), Some("insufficient units"));
}

#[test]
fn test_audit_sink_bounded() {
    let mut sink = InMemoryAuditSink::new(3);
    for job in 1..=5 {
        sink.record(AuditEvent::new(job, AuditAction::Submit, 0, None));
    }
    let ids: Vec<u64> = sink.events().iter().map(|e| e.job_id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
}

#[test]
fn test_events_for_job() {
    let mut sink = InMemoryAuditSink::new(10);
    sink.record(AuditEvent::new(1, AuditAction::Submit, 0, None));
    sink.record(AuditEvent::new(2, AuditAction::Submit, 0, None));
    sink.record(AuditEvent::new(1, AuditAction::Admit, 0, None));
    assert_eq!(sink.events_for(1).len(), 2);
    assert_eq!(sink.actions_for(2), vec![AuditAction::Submit]);
}

#[test]
fn test_audit_event_serializes_snake_case() {
    let event = AuditEvent::new(9, AuditAction::Compensate, 12, None);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "compensate");
    assert_eq!(json["job_id"], 9);
    assert_eq!(json["logical_time"], 12);
}
