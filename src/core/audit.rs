//! Audit trail of scheduling decisions.
//!
//! The scheduler records one event per job transition into an optional
//! sink. Sinks are shared behind a `parking_lot` mutex so a reporting layer
//! can read them while the scheduler keeps writing.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::clock::{now_ms, Timestamp};
use crate::util::serde::JobId;

/// Kind of scheduling decision being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Job accepted into the queue.
    Submit,
    /// Units allocated, job Scheduled.
    Admit,
    /// Admission postponed; job stays Pending.
    Defer,
    /// Job handed to the backend.
    Start,
    /// Inverse block run to restore unit state.
    Compensate,
    /// Job Completed.
    Complete,
    /// Job Failed.
    Fail,
}

impl AuditAction {
    /// Lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Admit => "admit",
            Self::Defer => "defer",
            Self::Start => "start",
            Self::Compensate => "compensate",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Random event id.
    pub event_id: Uuid,
    /// Job the event is about.
    pub job_id: JobId,
    /// What happened.
    pub action: AuditAction,
    /// Scheduler logical time.
    pub logical_time: Timestamp,
    /// Wall-clock milliseconds since the Unix epoch.
    pub created_at_ms: u128,
    /// Free-form context, e.g. the deferral reason.
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Build an event stamped with a fresh id and the current wall clock.
    pub fn new(
        job_id: JobId,
        action: AuditAction,
        logical_time: Timestamp,
        detail: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            job_id,
            action,
            logical_time,
            created_at_ms: now_ms(),
            detail,
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send {
    /// Record one event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory sink. Oldest events are dropped once full.
#[derive(Debug, Clone)]
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Sink keeping at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    /// Stored events for one job, oldest first.
    pub fn events_for(&self, job_id: JobId) -> Vec<AuditEvent> {
        self.events
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Actions recorded for one job, oldest first.
    pub fn actions_for(&self, job_id: JobId) -> Vec<AuditAction> {
        self.events
            .iter()
            .filter(|e| e.job_id == job_id)
            .map(|e| e.action)
            .collect()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event is stored.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}
