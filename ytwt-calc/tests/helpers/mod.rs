//! Test helper utilities
//!
//! Shared utilities for testing ytwt-calc

#![allow(dead_code)]

pub mod history;
pub mod log_capture;
pub mod mock_source;

pub use history::{entry, history_of, vid, watch_url};
pub use log_capture::{capture_logs, LogCapture};
pub use mock_source::MockSource;

use std::time::Duration;
use ytwt_calc::config::PipelineConfig;

/// Pipeline config with small delays, for paused-clock tests
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.min_interval = Duration::from_millis(100);
    config.backoff.base_delay = Duration::from_secs(1);
    config.backoff.max_delay = Duration::from_secs(8);
    config
}
