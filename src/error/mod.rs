//! Error types for seedforge.
//!
//! - [`PlanError`]: Invalid seed planner input.
//! - [`ConfigError`]: Config file loading and parsing failures.
//!
//! Sandbox failures are not errors at this level: the runner folds them into
//! the [`Outcome`](seedforge_types::Outcome) of an execution report.

pub mod config_error;
pub mod plan_error;

pub use config_error::ConfigError;
pub use plan_error::PlanError;

/// Convenience alias for planner results.
pub type PlanResult<T> = Result<T, PlanError>;
