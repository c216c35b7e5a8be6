//! Builders turning configuration into ready-to-use schedulers.

pub mod scheduler_builder;

pub use scheduler_builder::{build_scheduler, build_scheduler_with_audit};
