//! Watch-time unit conversion and human-readable formatting
//!
//! Conversions use fixed calendar units: a day is 86 400 s, a year is
//! 365.25 days and a month is one twelfth of that year.

use serde::{Deserialize, Serialize};

pub const SECONDS_IN_MINUTE: f64 = 60.0;
pub const SECONDS_IN_HOUR: f64 = 3_600.0;
pub const SECONDS_IN_DAY: f64 = 86_400.0;
pub const SECONDS_IN_YEAR: f64 = SECONDS_IN_DAY * 365.25;
pub const SECONDS_IN_MONTH: f64 = SECONDS_IN_YEAR / 12.0;

/// A total duration expressed in every reporting unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBreakdown {
    pub seconds: u64,
    pub minutes: f64,
    pub hours: f64,
    pub days: f64,
    pub months: f64,
    pub years: f64,
    /// `D days, H:MM:SS`
    pub formatted: String,
}

impl TimeBreakdown {
    pub fn from_seconds(total_seconds: u64) -> Self {
        let secs = total_seconds as f64;
        Self {
            seconds: total_seconds,
            minutes: secs / SECONDS_IN_MINUTE,
            hours: secs / SECONDS_IN_HOUR,
            days: secs / SECONDS_IN_DAY,
            months: secs / SECONDS_IN_MONTH,
            years: secs / SECONDS_IN_YEAR,
            formatted: format_day_clock(total_seconds),
        }
    }
}

/// Format whole seconds as `H:MM:SS`, prefixed with a day count when the
/// total reaches one day.
///
/// # Examples
///
/// ```
/// use ytwt_common::human_time::format_day_clock;
///
/// assert_eq!(format_day_clock(0), "0:00:00");
/// assert_eq!(format_day_clock(3661), "1:01:01");
/// assert_eq!(format_day_clock(90061), "1 day, 1:01:01");
/// assert_eq!(format_day_clock(172800), "2 days, 0:00:00");
/// ```
pub fn format_day_clock(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let remainder = total_seconds % 86_400;
    let hours = remainder / 3_600;
    let mins = (remainder % 3_600) / 60;
    let secs = remainder % 60;

    let clock = format!("{}:{:02}:{:02}", hours, mins, secs);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}
