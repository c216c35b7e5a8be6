//! Build a [`Scheduler`] from [`SchedulerConfig`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SchedulerConfig;
use crate::core::{ExecutionBackend, InMemoryAuditSink, Scheduler, SchedulerError, SharedAuditSink};

/// Validate `cfg` and build a scheduler over `backend`.
///
/// A non-zero `audit_capacity` attaches a fresh [`InMemoryAuditSink`]; use
/// [`build_scheduler_with_audit`] to keep a handle to it.
pub fn build_scheduler<B: ExecutionBackend>(
    cfg: &SchedulerConfig,
    backend: B,
) -> Result<Scheduler<B>, SchedulerError> {
    build_scheduler_with_audit(cfg, backend).map(|(scheduler, _)| scheduler)
}

/// Like [`build_scheduler`], also returning the audit sink when one was
/// configured.
pub fn build_scheduler_with_audit<B: ExecutionBackend>(
    cfg: &SchedulerConfig,
    backend: B,
) -> Result<(Scheduler<B>, Option<Arc<Mutex<InMemoryAuditSink>>>), SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let mut scheduler = Scheduler::new(cfg.unit_count, cfg.policy, backend)
        .with_max_live_jobs(cfg.max_live_jobs);
    if let Some(capacity) = cfg.archive_capacity {
        scheduler = scheduler.with_archive_capacity(capacity);
    }
    let sink = (cfg.audit_capacity > 0)
        .then(|| Arc::new(Mutex::new(InMemoryAuditSink::new(cfg.audit_capacity))));
    if let Some(sink) = &sink {
        let shared: SharedAuditSink = sink.clone();
        scheduler = scheduler.with_audit(shared);
    }
    tracing::info!(
        units = cfg.unit_count,
        policy = ?cfg.policy,
        max_live_jobs = cfg.max_live_jobs,
        archive_capacity = ?cfg.archive_capacity,
        audit = sink.is_some(),
        "scheduler built"
    );
    Ok((scheduler, sink))
}
