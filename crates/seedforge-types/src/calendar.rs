//! Period-aligned calendar arithmetic.
//!
//! All arithmetic works on [`NaiveDateTime`] so callers decide which zone a
//! timestamp lives in. The JavaScript engine exchanges timestamps as epoch
//! milliseconds; [`to_epoch_millis`] / [`from_epoch_millis`] treat naive values
//! as UTC for that purpose.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

/// Default serialization of window bounds (`YYYY/MM/DD`).
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d";

/// Calendar unit used both for partition windows and for lookback lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

/// Error returned when a period name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period '{0}' (expected day, week, month or year)")]
pub struct ParsePeriodError(pub String);

impl Period {
    pub const ALL: [Period; 4] = [Period::Day, Period::Week, Period::Month, Period::Year];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }

    /// Snap `at` back to the first instant of its period.
    pub fn start_of(self, at: NaiveDateTime, week_start: Weekday) -> NaiveDateTime {
        let date = at.date();
        let first = match self {
            Period::Day => date,
            Period::Week => {
                let back = (7 + date.weekday().num_days_from_monday()
                    - week_start.num_days_from_monday())
                    % 7;
                date - Days::new(u64::from(back))
            }
            Period::Month => date.with_day(1).unwrap_or(date),
            Period::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        };
        first.and_time(NaiveTime::MIN)
    }

    /// Last millisecond of the period containing `at`.
    ///
    /// Returns `None` when the following period would fall outside chrono's
    /// representable range.
    pub fn end_of(self, at: NaiveDateTime, week_start: Weekday) -> Option<NaiveDateTime> {
        let next = self.shift(self.start_of(at, week_start), 1)?;
        next.checked_sub_signed(TimeDelta::milliseconds(1))
    }

    /// Move `at` by `amount` whole periods (negative moves backwards).
    ///
    /// Month and year steps clamp the day to the length of the target month,
    /// so Jan 31 + 1 month is the last day of February.
    pub fn shift(self, at: NaiveDateTime, amount: i64) -> Option<NaiveDateTime> {
        let magnitude = amount.unsigned_abs();
        let forward = amount >= 0;
        match self {
            Period::Day => shift_days(at, magnitude, forward),
            Period::Week => shift_days(at, magnitude.checked_mul(7)?, forward),
            Period::Month => shift_months(at, magnitude, forward),
            Period::Year => shift_months(at, magnitude.checked_mul(12)?, forward),
        }
    }
}

fn shift_days(at: NaiveDateTime, days: u64, forward: bool) -> Option<NaiveDateTime> {
    if forward {
        at.checked_add_days(Days::new(days))
    } else {
        at.checked_sub_days(Days::new(days))
    }
}

fn shift_months(at: NaiveDateTime, months: u64, forward: bool) -> Option<NaiveDateTime> {
    let months = Months::new(u32::try_from(months).ok()?);
    if forward {
        at.checked_add_months(months)
    } else {
        at.checked_sub_months(months)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "day" | "days" => Ok(Period::Day),
            "w" | "week" | "weeks" => Ok(Period::Week),
            "m" | "month" | "months" => Ok(Period::Month),
            "y" | "year" | "years" => Ok(Period::Year),
            _ => Err(ParsePeriodError(s.to_string())),
        }
    }
}

/// Naive timestamp to epoch milliseconds, reading it as UTC.
pub fn to_epoch_millis(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp_millis()
}

pub fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Parse a calendar date in `YYYY-MM-DD` or `YYYY/MM/DD` form, or a full
/// `YYYY-MM-DDTHH:MM:SS` timestamp.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(at) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(at);
    }
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(|date| date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(13, 45, 10).unwrap()
    }

    #[test]
    fn test_start_of_each_period() {
        let t = at(2024, 3, 15); // Friday
        assert_eq!(Period::Day.start_of(t, Weekday::Sun), at(2024, 3, 15).date().and_time(NaiveTime::MIN));
        assert_eq!(Period::Week.start_of(t, Weekday::Sun).date(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(Period::Week.start_of(t, Weekday::Mon).date(), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(Period::Month.start_of(t, Weekday::Sun).date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(Period::Year.start_of(t, Weekday::Sun).date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_week_start_on_same_weekday_is_identity() {
        let sunday = at(2024, 3, 10);
        assert_eq!(Period::Week.start_of(sunday, Weekday::Sun).date(), sunday.date());
    }

    #[test]
    fn test_end_of_month_handles_leap_year() {
        let end = Period::Month.end_of(at(2024, 2, 10), Weekday::Sun).unwrap();
        assert_eq!(end.to_string(), "2024-02-29 23:59:59.999");
    }

    #[test]
    fn test_shift_month_clamps_day() {
        let jan31 = at(2023, 1, 31);
        assert_eq!(Period::Month.shift(jan31, 1).unwrap().date(), NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
        assert_eq!(Period::Year.shift(at(2024, 2, 29), -1).unwrap().date(), NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    }

    #[test]
    fn test_shift_overflow_is_none() {
        assert!(Period::Year.shift(at(2024, 1, 1), i64::MAX).is_none());
    }

    #[test]
    fn test_parse_period() {
        assert_eq!("Month".parse::<Period>().unwrap(), Period::Month);
        assert_eq!("w".parse::<Period>().unwrap(), Period::Week);
        assert!("fortnight".parse::<Period>().is_err());
    }

    #[test]
    fn test_epoch_millis_roundtrip_keeps_millis() {
        let t = at(2024, 3, 15) + TimeDelta::milliseconds(123);
        assert_eq!(from_epoch_millis(to_epoch_millis(t)), Some(t));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert_eq!(parse_timestamp("2024/03/15"), parse_timestamp("2024-03-15"));
        assert_eq!(
            parse_timestamp("2024-03-15T10:00:00").unwrap().to_string(),
            "2024-03-15 10:00:00"
        );
        assert!(parse_timestamp("15.03.2024").is_none());
    }
}
