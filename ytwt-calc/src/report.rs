//! Result snapshot and plain-text report
//!
//! [`WatchTimeSnapshot`] is the JSON document written with `--output`.
//! [`ReportFormatter`] renders the same numbers for the terminal.

use crate::config::RunSettings;
use crate::error::CalcResult;
use crate::models::RunningStatistics;
use crate::services::history_parser::HistorySummary;
use crate::workflow::RunOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use ytwt_common::human_time::TimeBreakdown;

/// Complete result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchTimeSnapshot {
    /// Generation time
    pub timestamp: DateTime<Utc>,
    /// `"done"` or `"failed: <reason>"`
    pub outcome: String,
    pub time_stats: TimeBreakdown,
    pub video_stats: VideoStats,
    pub history_stats: HistorySummary,
    pub parameters: SnapshotParameters,
}

/// Per-classification video counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStats {
    pub total_videos: u64,
    pub deleted_videos: u64,
    pub skipped_videos: u64,
    pub processed_videos: u64,
    pub skipped_unresolvable: u64,
    pub skipped_quota_exhausted: u64,
    pub skipped_malformed: u64,
}

impl From<&RunningStatistics> for VideoStats {
    fn from(stats: &RunningStatistics) -> Self {
        Self {
            total_videos: stats.total_count,
            deleted_videos: stats.deleted_count,
            skipped_videos: stats.skipped_count,
            processed_videos: stats.processed_count,
            skipped_unresolvable: stats.skipped_by_reason.unresolvable,
            skipped_quota_exhausted: stats.skipped_by_reason.quota_exhausted,
            skipped_malformed: stats.skipped_by_reason.malformed,
        }
    }
}

/// Inputs that produced the numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotParameters {
    pub start_date: String,
    pub end_date: Option<String>,
    pub max_duration: u64,
    pub batch_size: usize,
    pub history_file: String,
}

impl SnapshotParameters {
    pub fn from_settings(settings: &RunSettings) -> Self {
        Self {
            start_date: settings.start_date.clone(),
            end_date: settings.end_date.clone(),
            max_duration: settings.pipeline.max_duration_secs,
            batch_size: settings.pipeline.batch_size,
            history_file: settings.history_file.display().to_string(),
        }
    }
}

impl WatchTimeSnapshot {
    pub fn new(outcome: &RunOutcome, parameters: SnapshotParameters) -> Self {
        let report = outcome.report();
        Self {
            timestamp: ytwt_common::time::now(),
            outcome: outcome.describe(),
            time_stats: TimeBreakdown::from_seconds(report.statistics.total_seconds),
            video_stats: VideoStats::from(&report.statistics),
            history_stats: report.history,
            parameters,
        }
    }

    /// Write as pretty-printed JSON
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> CalcResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(ytwt_common::Error::from)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    pub fn import_json<P: AsRef<Path>>(path: P) -> CalcResult<Self> {
        let file = File::open(path)?;
        let snapshot = serde_json::from_reader(file).map_err(ytwt_common::Error::from)?;
        Ok(snapshot)
    }
}

/// Terminal rendering of a run
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn format(outcome: &RunOutcome) -> String {
        let report = outcome.report();
        let stats = &report.statistics;
        let time = TimeBreakdown::from_seconds(stats.total_seconds);

        let mut output = String::new();
        output.push_str("\nYouTube watch time\n");
        output.push_str("==================\n");
        output.push_str(&format!("Total: {}\n", time.formatted));
        output.push_str(&format!("  {} seconds\n", time.seconds));
        output.push_str(&format!("  {:.1} minutes\n", time.minutes));
        output.push_str(&format!("  {:.1} hours\n", time.hours));
        output.push_str(&format!("  {:.2} days\n", time.days));
        output.push_str(&format!("  {:.2} months\n", time.months));
        output.push_str(&format!("  {:.3} years\n\n", time.years));

        output.push_str("Videos\n");
        output.push_str(&format!("  Counted:  {}\n", stats.processed_count));
        output.push_str(&format!("  Deleted:  {}\n", stats.deleted_count));
        output.push_str(&format!("  Skipped:  {}", stats.skipped_count));
        if stats.skipped_count > 0 {
            let by = &stats.skipped_by_reason;
            output.push_str(&format!(
                " (unresolvable {}, quota exhausted {}, malformed {})",
                by.unresolvable, by.quota_exhausted, by.malformed
            ));
        }
        output.push('\n');
        output.push_str(&format!("  Total:    {}\n\n", stats.total_count));

        output.push_str(&format!(
            "History: {} records, {} in range, {} outside range, {} unusable\n",
            report.history.records,
            report.history.events,
            report.history.out_of_window,
            report.history.malformed
        ));
        output.push_str(&format!(
            "Batches: {}/{} resolved with {} requests in {:.1}s\n",
            report.batches_completed,
            report.batches_total,
            report.requests_made,
            report.elapsed.as_secs_f64()
        ));

        if let Some(error) = outcome.error() {
            output.push_str(&format!("\nRun did not finish: {}\n", error));
        }
        output
    }
}
