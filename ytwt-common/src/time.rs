//! Timestamp utilities

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Parse an RFC 3339 timestamp (`Z` or numeric offset) into UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp {:?}: {}", value, e)))
}

/// Parse a user-supplied date bound
///
/// Accepts a bare `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date_bound(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| Error::InvalidInput(format!("Invalid date {:?}", value)));
    }
    parse_timestamp(trimmed).map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid date {:?}: use YYYY-MM-DD or RFC 3339 (e.g. 2000-01-01T00:00:00Z)",
            value
        ))
    })
}
