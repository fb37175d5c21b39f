//! Seed planning
//!
//! Splits the range `[now - lookback, now]` into period-aligned windows and
//! turns each window into one request URL:
//!
//! ```text
//! <base_url>?<extra params>&start=YYYY/MM/DD&end=YYYY/MM/DD
//! ```
//!
//! Planning is pure: "now" is always passed in, never read from the clock.
//! [`codegen`] renders the same algorithm as a `getSeeds()` script for the
//! sandbox runner.

pub mod codegen;
pub mod lookback;
pub mod windows;

use chrono::{NaiveDateTime, Weekday};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use seedforge_types::{Period, DEFAULT_DATE_FORMAT};

use crate::error::PlanResult;

pub use codegen::render_seed_function;
pub use lookback::{Lookback, DEFAULT_LOOKBACK_MONTHS};
pub use windows::{partition, plan_seeds, plan_windows, DateWindow};

/// Input to the seed planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRequest {
    /// Opaque URL prefix; the query string is appended after `?`.
    pub base_url: String,
    pub period: Period,
    #[serde(default)]
    pub lookback: Lookback,
    /// Extra query parameters, emitted in insertion order.
    #[serde(default)]
    pub extra_params: IndexMap<String, String>,
}

impl SeedRequest {
    pub fn new(base_url: impl Into<String>, period: Period) -> Self {
        Self {
            base_url: base_url.into(),
            period,
            lookback: Lookback::default(),
            extra_params: IndexMap::new(),
        }
    }

    pub fn with_lookback(mut self, lookback: Lookback) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }
}

/// Calendar conventions shared by planning and code generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    /// First day of a week window.
    pub week_start: Weekday,
    /// strftime pattern for the `start`/`end` query values.
    pub date_format: String,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            week_start: Weekday::Sun,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl PlannerOptions {
    /// Check that `date_format` can render planner dates.
    pub fn validate(&self) -> PlanResult<()> {
        windows::validate_date_format(&self.date_format)
    }
}

/// Planner bound to a fixed set of [`PlannerOptions`].
#[derive(Debug, Clone, Default)]
pub struct SeedPlanner {
    options: PlannerOptions,
}

impl SeedPlanner {
    pub fn new(options: PlannerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    pub fn plan(&self, request: &SeedRequest, now: NaiveDateTime) -> PlanResult<Vec<String>> {
        plan_seeds(request, now, &self.options)
    }

    pub fn windows(&self, request: &SeedRequest, now: NaiveDateTime) -> PlanResult<Vec<DateWindow>> {
        plan_windows(request, now, &self.options)
    }

    pub fn render(&self, request: &SeedRequest) -> PlanResult<String> {
        render_seed_function(request, &self.options)
    }
}

/// Plan seeds with default options (Sunday weeks, `YYYY/MM/DD` dates).
pub fn plan(request: &SeedRequest, now: NaiveDateTime) -> PlanResult<Vec<String>> {
    plan_seeds(request, now, &PlannerOptions::default())
}
