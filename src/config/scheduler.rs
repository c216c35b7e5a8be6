//! Scheduler configuration structures.

use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, SchedulingPolicy};

/// Environment key for the pool size.
pub const ENV_UNITS: &str = "HYBRID_SCHED_UNITS";
/// Environment key for the selection policy.
pub const ENV_POLICY: &str = "HYBRID_SCHED_POLICY";
/// Environment key for the live job limit.
pub const ENV_MAX_LIVE_JOBS: &str = "HYBRID_SCHED_MAX_LIVE_JOBS";
/// Environment key for the audit ring size.
pub const ENV_AUDIT_CAPACITY: &str = "HYBRID_SCHED_AUDIT_CAPACITY";
/// Environment key for the terminal job archive bound.
pub const ENV_ARCHIVE_CAPACITY: &str = "HYBRID_SCHED_ARCHIVE_CAPACITY";

const DEFAULT_UNITS: usize = 8;
const DEFAULT_MAX_LIVE_JOBS: usize = 1024;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Units in the pool.
    pub unit_count: usize,
    /// Selection policy.
    #[serde(default)]
    pub policy: SchedulingPolicy,
    /// Maximum non-terminal jobs before submissions are rejected.
    #[serde(default = "default_max_live_jobs")]
    pub max_live_jobs: usize,
    /// In-memory audit ring size. Zero disables auditing.
    #[serde(default)]
    pub audit_capacity: usize,
    /// Terminal jobs kept for status lookups. Unset keeps all of them.
    #[serde(default)]
    pub archive_capacity: Option<usize>,
}

const fn default_max_live_jobs() -> usize {
    DEFAULT_MAX_LIVE_JOBS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            unit_count: DEFAULT_UNITS,
            policy: SchedulingPolicy::default(),
            max_live_jobs: DEFAULT_MAX_LIVE_JOBS,
            audit_capacity: 0,
            archive_capacity: None,
        }
    }
}

impl SchedulerConfig {
    /// Config for `unit_count` units with defaults elsewhere.
    pub fn new(unit_count: usize) -> Self {
        Self {
            unit_count,
            ..Self::default()
        }
    }

    /// Set the policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the live job limit.
    #[must_use]
    pub const fn with_max_live_jobs(mut self, max_live_jobs: usize) -> Self {
        self.max_live_jobs = max_live_jobs;
        self
    }

    /// Set the audit ring size.
    #[must_use]
    pub const fn with_audit_capacity(mut self, audit_capacity: usize) -> Self {
        self.audit_capacity = audit_capacity;
        self
    }

    /// Bound the terminal job archive.
    #[must_use]
    pub const fn with_archive_capacity(mut self, archive_capacity: usize) -> Self {
        self.archive_capacity = Some(archive_capacity);
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.unit_count == 0 {
            return Err("unit_count must be greater than 0".into());
        }
        if u32::try_from(self.unit_count).is_err() {
            return Err(format!("unit_count must fit in 32 bits, got {}", self.unit_count));
        }
        if self.max_live_jobs == 0 {
            return Err("max_live_jobs must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading `.env`
    /// first when present. Unset keys keep their defaults.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let defaults = Self::default();
        let cfg = Self {
            unit_count: parse_key(&lookup, ENV_UNITS)?.unwrap_or(defaults.unit_count),
            policy: lookup(ENV_POLICY)
                .map(|v| v.parse::<SchedulingPolicy>())
                .transpose()
                .with_context(|| format!("{ENV_POLICY} must be fifo, priority or resource_aware"))?
                .unwrap_or(defaults.policy),
            max_live_jobs: parse_key(&lookup, ENV_MAX_LIVE_JOBS)?.unwrap_or(defaults.max_live_jobs),
            audit_capacity: parse_key(&lookup, ENV_AUDIT_CAPACITY)?
                .unwrap_or(defaults.audit_capacity),
            archive_capacity: parse_key(&lookup, ENV_ARCHIVE_CAPACITY)?,
        };
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_key(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<Option<usize>> {
    lookup(key)
        .map(|v| v.trim().parse::<usize>())
        .transpose()
        .with_context(|| format!("{key} must be a non-negative integer"))
}

impl FromStr for SchedulingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fifo" => Ok(Self::Fifo),
            "priority" => Ok(Self::Priority),
            "resource_aware" => Ok(Self::ResourceAware),
            other => Err(anyhow::anyhow!("unknown scheduling policy `{other}`")),
        }
    }
}
