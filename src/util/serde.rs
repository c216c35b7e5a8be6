//! Serializable identifier and priority types shared across modules.

use serde::{Deserialize, Serialize};

/// Stable identifier of a unit owned by the resource pool.
pub type UnitId = u32;

/// Block-local unit index used by operation targets.
pub type UnitIndex = u32;

/// Job identifier assigned by the job queue.
pub type JobId = u64;

/// Operation identifier.
pub type OperationId = u64;

/// Job priority levels. Ordering follows urgency: `Critical > High > Normal > Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Elevated priority.
    High,
    /// Served before everything else.
    Critical,
}

impl Priority {
    /// Numeric rank, `Low = 0` through `Critical = 3`.
    pub const fn value(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Rank scaled into `[0, 1]`.
    pub fn normalized(self) -> f64 {
        f64::from(self.value()) / f64::from(Self::Critical.value())
    }
}
