//! Seed planning errors.

use thiserror::Error;

/// Invalid input passed to the seed planner.
///
/// Raised before any window is computed; the planner never returns partial
/// results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
    #[error("Invalid lookback '{input}': {reason}")]
    InvalidLookback { input: String, reason: String },
    #[error("Date range out of bounds: {0}")]
    OutOfRange(String),
    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),
    #[error("Failed to render seed function: {0}")]
    Render(String),
}

impl From<seedforge_types::ParsePeriodError> for PlanError {
    fn from(e: seedforge_types::ParsePeriodError) -> Self {
        PlanError::InvalidPeriod(e.0)
    }
}
