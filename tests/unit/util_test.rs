//! Tests for utility functions

use prometheus_hybrid_scheduler::util::clock::{now_ms, LogicalClock};
use prometheus_hybrid_scheduler::util::serde::Priority;

#[test]
fn test_now_ms_returns_reasonable_value() {
    let now = now_ms();
    // Should be after 2020-01-01
    assert!(now > 1_577_836_800_000);
}

#[test]
fn test_logical_clock_advances() {
    let mut clock = LogicalClock::new();
    assert_eq!(clock.now(), 0);
    assert_eq!(clock.advance(5), 5);
    assert_eq!(clock.advance(0), 5);
    assert_eq!(clock.advance(u64::MAX), u64::MAX);
}

#[test]
fn test_priority_ordering() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_priority_normalized_range() {
    assert!(Priority::Low.normalized().abs() < f64::EPSILON);
    assert!((Priority::Critical.normalized() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_priority_serde() {
    let json = serde_json::to_string(&Priority::Critical).unwrap();
    assert_eq!(json, "\"critical\"");
    let back: Priority = serde_json::from_str("\"low\"").unwrap();
    assert_eq!(back, Priority::Low);
}
