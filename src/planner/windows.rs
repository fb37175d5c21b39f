//! Date-range partitioning and seed URL assembly.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDateTime;
use serde::Serialize;
use seedforge_types::query::{self, RESERVED_KEYS};
use seedforge_types::Period;

use super::{PlannerOptions, SeedRequest};
use crate::error::{PlanError, PlanResult};

/// One partition step, `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl DateWindow {
    /// Both bounds rendered with `format`.
    ///
    /// Fails for patterns chrono accepts but cannot render without an
    /// offset, such as `%z`.
    pub fn format(&self, format: &str) -> PlanResult<(String, String)> {
        Ok((format_at(self.from, format)?, format_at(self.to, format)?))
    }
}

fn format_at(at: NaiveDateTime, format: &str) -> PlanResult<String> {
    let mut out = String::new();
    write!(out, "{}", at.format_with_items(StrftimeItems::new(format)))
        .map_err(|_| PlanError::InvalidDateFormat(format.to_string()))?;
    Ok(out)
}

/// Split `[start, end]` into period-aligned windows.
///
/// Bounds given in the wrong order are swapped. The first and last windows
/// may be partial; the bound equal to `end` is still emitted.
pub fn partition(
    start: NaiveDateTime,
    end: NaiveDateTime,
    period: Period,
    options: &PlannerOptions,
) -> PlanResult<Vec<DateWindow>> {
    let (start, end) = if end < start { (end, start) } else { (start, end) };

    let mut windows = Vec::new();
    let mut current = start;
    while current <= end {
        let to = period
            .end_of(current, options.week_start)
            .map_or(end, |period_end| period_end.min(end));
        windows.push(DateWindow { from: current, to });

        let Some(next) = period.shift(current, 1) else {
            break;
        };
        current = period.start_of(next, options.week_start);
    }

    if windows.is_empty() {
        return Err(PlanError::OutOfRange(format!("{start} .. {end}")));
    }
    Ok(windows)
}

/// Windows for `request` ending at `now`.
pub fn plan_windows(
    request: &SeedRequest,
    now: NaiveDateTime,
    options: &PlannerOptions,
) -> PlanResult<Vec<DateWindow>> {
    validate_request(request, options)?;
    let start = request.lookback.rewind(now)?;
    partition(start, now, request.period, options)
}

/// Seed URLs for `request` ending at `now`, in chronological order.
pub fn plan_seeds(
    request: &SeedRequest,
    now: NaiveDateTime,
    options: &PlannerOptions,
) -> PlanResult<Vec<String>> {
    let windows = plan_windows(request, now, options)?;
    let prefix = encode_extra_params(request);

    let seeds = windows
        .iter()
        .map(|window| seed_url(&request.base_url, &prefix, window, options))
        .collect::<PlanResult<Vec<String>>>()?;
    tracing::debug!(
        base_url = %request.base_url,
        period = %request.period,
        lookback = %request.lookback,
        count = seeds.len(),
        "planned seeds"
    );
    Ok(seeds)
}

fn validate_request(request: &SeedRequest, options: &PlannerOptions) -> PlanResult<()> {
    if request.base_url.trim().is_empty() {
        return Err(PlanError::InvalidBaseUrl("base URL is empty".to_string()));
    }
    validate_date_format(&options.date_format)
}

/// Reject patterns that do not parse or cannot render a naive timestamp.
pub(crate) fn validate_date_format(format: &str) -> PlanResult<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(PlanError::InvalidDateFormat(format.to_string()));
    }
    format_at(NaiveDateTime::default(), format).map(|_| ())
}

/// Form-encoded extra parameters, reserved keys removed.
pub(crate) fn encode_extra_params(request: &SeedRequest) -> String {
    let kept = request.extra_params.iter().filter(|(key, _)| {
        let reserved = query::is_reserved(key);
        if reserved {
            tracing::warn!(
                key = %key,
                "extra parameter collides with a reserved key ({}); computed value wins",
                RESERVED_KEYS.join("/")
            );
        }
        !reserved
    });
    query::encode_pairs(kept.map(|(k, v)| (k.as_str(), v.as_str())))
}

fn seed_url(
    base_url: &str,
    prefix: &str,
    window: &DateWindow,
    options: &PlannerOptions,
) -> PlanResult<String> {
    let (from, to) = window.format(&options.date_format)?;
    Ok(if prefix.is_empty() {
        format!("{base_url}?start={from}&end={to}")
    } else {
        format!("{base_url}?{prefix}&start={from}&end={to}")
    })
}
