//! ISO-8601 duration parsing
//!
//! The YouTube Data API reports `contentDetails.duration` as an ISO-8601
//! duration such as `PT1H2M10S`, `P1DT3M` or `P0D` (live and upcoming
//! streams). Year and month designators are rejected since they have no fixed
//! length in seconds.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("duration must start with 'P': {0:?}")]
    MissingPrefix(String),
    #[error("duration has no components: {0:?}")]
    Empty(String),
    #[error("unexpected character {1:?} in duration {0:?}")]
    UnexpectedChar(String, char),
    #[error("designator {1:?} out of order or repeated in {0:?}")]
    OutOfOrder(String, char),
    #[error("year/month designators are not supported: {0:?}")]
    CalendarUnit(String),
    #[error("duration overflows: {0:?}")]
    Overflow(String),
}

/// Parse an ISO-8601 duration into whole seconds
///
/// # Examples
///
/// ```
/// use ytwt_calc::utils::iso_duration::parse_iso8601_duration;
///
/// assert_eq!(parse_iso8601_duration("PT1H2M10S"), Ok(3730));
/// assert_eq!(parse_iso8601_duration("P1DT1S"), Ok(86401));
/// assert_eq!(parse_iso8601_duration("P0D"), Ok(0));
/// ```
pub fn parse_iso8601_duration(input: &str) -> Result<u64, DurationParseError> {
    let text = input.trim();
    let body = text
        .strip_prefix('P')
        .ok_or_else(|| DurationParseError::MissingPrefix(input.to_string()))?;

    // Designators in the order they may appear; each at most once
    const ORDER: [char; 5] = ['W', 'D', 'H', 'M', 'S'];
    let mut rank = 0usize;
    let mut in_time = false;
    let mut digits = String::new();
    let mut components = 0usize;
    let mut total: u64 = 0;

    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            'T' if !in_time && digits.is_empty() => {
                in_time = true;
                rank = 2;
            }
            'Y' => return Err(DurationParseError::CalendarUnit(input.to_string())),
            'M' if !in_time => return Err(DurationParseError::CalendarUnit(input.to_string())),
            'W' | 'D' | 'H' | 'M' | 'S' => {
                let time_unit = matches!(c, 'H' | 'M' | 'S');
                if digits.is_empty() || time_unit != in_time {
                    return Err(DurationParseError::UnexpectedChar(input.to_string(), c));
                }
                let pos = ORDER
                    .iter()
                    .position(|&d| d == c)
                    .ok_or_else(|| DurationParseError::UnexpectedChar(input.to_string(), c))?;
                if pos < rank {
                    return Err(DurationParseError::OutOfOrder(input.to_string(), c));
                }
                rank = pos + 1;

                let value: u64 = digits
                    .parse()
                    .map_err(|_| DurationParseError::Overflow(input.to_string()))?;
                let unit: u64 = match c {
                    'W' => 604_800,
                    'D' => 86_400,
                    'H' => 3_600,
                    'M' => 60,
                    _ => 1,
                };
                total = value
                    .checked_mul(unit)
                    .and_then(|secs| total.checked_add(secs))
                    .ok_or_else(|| DurationParseError::Overflow(input.to_string()))?;
                digits.clear();
                components += 1;
            }
            other => return Err(DurationParseError::UnexpectedChar(input.to_string(), other)),
        }
    }

    if !digits.is_empty() {
        return Err(DurationParseError::UnexpectedChar(
            input.to_string(),
            body.chars().last().unwrap_or('P'),
        ));
    }
    if components == 0 {
        return Err(DurationParseError::Empty(input.to_string()));
    }
    Ok(total)
}
