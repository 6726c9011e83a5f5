//! Utility modules for ytwt-calc

pub mod backoff;
pub mod iso_duration;

pub use backoff::BackoffPolicy;
pub use iso_duration::{parse_iso8601_duration, DurationParseError};
