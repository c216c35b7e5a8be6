//! Tests for error types

use prometheus_hybrid_scheduler::core::{
    IrError, JobState, OperationKind, PoolError, QueueError, SchedulerError,
};

#[test]
fn test_pool_error_messages() {
    assert_eq!(PoolError::ExhaustedPool.to_string(), "unit pool exhausted");
    assert_eq!(PoolError::UnknownUnit(3).to_string(), "unknown unit 3");
}

#[test]
fn test_invalid_transition_message() {
    let err = QueueError::InvalidTransition {
        job: 4,
        from: JobState::Completed,
        to: JobState::Running,
    };
    assert_eq!(format!("{err}"), "job 4: invalid transition Completed -> Running");
}

#[test]
fn test_invalid_block_counts_violations() {
    let err = SchedulerError::InvalidBlock {
        name: "b".into(),
        violations: vec![
            IrError::NotReversible("b".into()),
            IrError::OutOfRangeUnitIndex {
                operation: 1,
                index: 9,
                max: 3,
            },
        ],
    };
    assert_eq!(err.to_string(), "block `b` failed validation with 2 violation(s)");
}

#[test]
fn test_wrapped_errors_are_transparent() {
    let err: SchedulerError = PoolError::UnknownUnit(7).into();
    assert_eq!(err.to_string(), "unknown unit 7");
    let err: SchedulerError = IrError::ArityMismatch {
        operation: 2,
        kind: OperationKind::Cnot,
        expected: 2,
        actual: 1,
    }
    .into();
    assert!(err.to_string().contains("expects 2 distinct targets"));
}

#[test]
fn test_recoverable_classification() {
    assert!(SchedulerError::InsufficientUnits {
        requested: 3,
        available: 1
    }
    .is_recoverable());
    assert!(SchedulerError::ResourceConflict {
        holder: 1,
        units: vec![0]
    }
    .is_recoverable());
    assert!(SchedulerError::DependenciesNotMet(2).is_recoverable());
    assert!(!SchedulerError::Queue(QueueError::UnknownJob(1)).is_recoverable());
    assert!(!SchedulerError::Ir(IrError::NotReversible("m".into())).is_recoverable());
    assert!(!SchedulerError::Pool(PoolError::UnknownUnit(0)).is_recoverable());
}
