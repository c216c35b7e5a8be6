//! Tests for configuration validation

use prometheus_hybrid_scheduler::config::SchedulerConfig;
use prometheus_hybrid_scheduler::core::SchedulingPolicy;

#[test]
fn test_default_config_is_valid() {
    assert!(SchedulerConfig::default().validate().is_ok());
}

#[test]
fn test_config_invalid_unit_count() {
    assert!(SchedulerConfig::new(0).validate().is_err());
}

#[test]
fn test_config_invalid_live_jobs() {
    let cfg = SchedulerConfig::new(4).with_max_live_jobs(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "unit_count": 12,
        "policy": "resource_aware",
        "max_live_jobs": 64,
        "audit_capacity": 256
    }"#;
    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.unit_count, 12);
    assert_eq!(cfg.policy, SchedulingPolicy::ResourceAware);
    assert_eq!(cfg.max_live_jobs, 64);
    assert_eq!(cfg.audit_capacity, 256);
}

#[test]
fn test_config_from_json_parse_error() {
    let err = SchedulerConfig::from_json_str("{not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_config_from_json_unknown_policy() {
    assert!(SchedulerConfig::from_json_str(r#"{"unit_count": 2, "policy": "lottery"}"#).is_err());
}

#[test]
fn test_config_round_trips_through_json() {
    let cfg = SchedulerConfig::new(3)
        .with_policy(SchedulingPolicy::Fifo)
        .with_audit_capacity(16);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_policy_from_str() {
    assert_eq!("FIFO".parse::<SchedulingPolicy>().unwrap(), SchedulingPolicy::Fifo);
    assert_eq!(
        "resource-aware".parse::<SchedulingPolicy>().unwrap(),
        SchedulingPolicy::ResourceAware
    );
    assert!("".parse::<SchedulingPolicy>().is_err());
}
