//! Lookback length: how far back from "now" the planned range begins.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use seedforge_types::Period;

use crate::error::PlanError;

/// Lookback applied when none is configured.
pub const DEFAULT_LOOKBACK_MONTHS: i64 = 5;

/// Signed calendar length, e.g. `5 months` or `-3 days`.
///
/// A negative lookback places the range start after "now"; the planner's swap
/// rule normalizes that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Lookback {
    pub amount: i64,
    pub unit: Period,
}

impl Lookback {
    pub fn new(amount: i64, unit: Period) -> Self {
        Self { amount, unit }
    }

    pub fn months(amount: i64) -> Self {
        Self::new(amount, Period::Month)
    }

    /// `now - self`.
    pub fn rewind(&self, now: NaiveDateTime) -> Result<NaiveDateTime, PlanError> {
        self.amount
            .checked_neg()
            .and_then(|back| self.unit.shift(now, back))
            .ok_or_else(|| PlanError::OutOfRange(format!("{now} minus {self}")))
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Self::months(DEFAULT_LOOKBACK_MONTHS)
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.amount.abs() == 1 { "" } else { "s" };
        write!(f, "{} {}{}", self.amount, self.unit, plural)
    }
}

impl FromStr for Lookback {
    type Err = PlanError;

    /// Accepts `"<amount> <unit>"` and compact `"<amount><unit>"` forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| PlanError::InvalidLookback {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let text = s.trim();
        if text.is_empty() {
            return Err(invalid("empty lookback"));
        }

        let sign_len = usize::from(text.starts_with(['+', '-']));
        let digits_end = text[sign_len..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(text.len(), |i| i + sign_len);
        if digits_end == sign_len {
            return Err(invalid("missing amount"));
        }

        let amount = text[..digits_end]
            .parse::<i64>()
            .map_err(|_| invalid("amount out of range"))?;
        let unit_text = text[digits_end..].trim();
        if unit_text.is_empty() {
            return Err(invalid("missing unit"));
        }
        let unit = unit_text
            .parse::<Period>()
            .map_err(|_| invalid(&format!("unknown unit '{unit_text}'")))?;

        Ok(Self { amount, unit })
    }
}

impl TryFrom<String> for Lookback {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lookback> for String {
    fn from(value: Lookback) -> Self {
        value.to_string()
    }
}
