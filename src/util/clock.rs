//! Wall-clock and logical-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Logical scheduler time, measured in abstract ticks.
pub type Timestamp = u64;

/// Milliseconds since the Unix epoch. Returns 0 if the system clock is set
/// before the epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Monotonic logical clock owned by the scheduler.
///
/// Only moves forward; advancing by zero is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalClock {
    now: Timestamp,
}

impl LogicalClock {
    /// Create a clock at tick zero.
    pub const fn new() -> Self {
        Self { now: 0 }
    }

    /// Current tick.
    pub const fn now(&self) -> Timestamp {
        self.now
    }

    /// Advance by `ticks`, saturating at `u64::MAX`, and return the new time.
    pub fn advance(&mut self, ticks: u64) -> Timestamp {
        self.now = self.now.saturating_add(ticks);
        self.now
    }
}
