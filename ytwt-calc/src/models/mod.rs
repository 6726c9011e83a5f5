//! Data models for the watch-time pipeline

pub mod outcome;
pub mod statistics;
pub mod watch_event;

pub use outcome::{LookupOutcome, SkipReason};
pub use statistics::{RunningStatistics, SkipBreakdown};
pub use watch_event::{DateWindow, VideoId, WatchEvent, VIDEO_ID_LEN};
