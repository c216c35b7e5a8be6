//! # Prometheus Hybrid Scheduler
//!
//! A relationship-aware resource pool, a composable operation IR and a
//! multi-policy job scheduler for scarce, stateful units.
//!
//! Units are handed out by a [`core::ResourcePool`] that also tracks which
//! units carry correlated state. A correlated unit cannot be reclaimed on
//! its own; the scheduler clears a job's relationships explicitly before
//! releasing its units.
//!
//! ## Key Features
//!
//! - **Immutable block IR**: [`core::OperationBlock`] values are built by
//!   `append`, `combine_sequential` and `nest`, with aggregate cost and
//!   reversibility derived on the way. Nested blocks are shared by `Arc`.
//! - **Inversion and conjugation**: reversible blocks produce their inverse,
//!   which also powers automatic compensation after execution.
//! - **Three policies**: FIFO, priority (FIFO among equals) and
//!   resource-aware selection, with optional advisory scoring.
//! - **All-or-nothing admission**: a job gets every unit it needs or none;
//!   shortages and conflicts defer the job instead of failing it.
//! - **Logical clock**: time advances by each run's duration.
//!
//! ## Usage
//!
//! ```rust
//! use prometheus_hybrid_scheduler::core::{
//!     ghz, JobSubmission, ScheduleOutcome, Scheduler, SchedulingPolicy, SimulatedBackend,
//! };
//! use prometheus_hybrid_scheduler::util::serde::Priority;
//!
//! let mut scheduler = Scheduler::new(4, SchedulingPolicy::Priority, SimulatedBackend::new());
//! let id = scheduler
//!     .submit(JobSubmission::new("ghz", ghz(3)).with_priority(Priority::High))
//!     .unwrap();
//!
//! match scheduler.schedule_and_execute_next().unwrap() {
//!     ScheduleOutcome::Executed(report) => assert_eq!(report.job_id, id),
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! assert_eq!(scheduler.resource_usage().free, 4);
//! ```
//!
//! For complete scenarios, see `tests/scheduler_algorithm_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: pool, IR, queue and scheduler.
pub mod core;
/// Configuration models.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
