//! Watch-time pipeline orchestration
//!
//! The driver walks `Idle → Parsing → Batching → Resolving → Aggregating →
//! Done`, with `Failed` reachable from parsing, batching and resolving.
//! Progress is reported through an optional [`ProgressObserver`].

pub mod driver;
pub mod event_bridge;

pub use driver::PipelineDriver;
pub use event_bridge::EventBusObserver;

use crate::error::CalcError;
use crate::models::RunningStatistics;
use crate::services::history_parser::HistorySummary;
use std::time::Duration;
use ytwt_common::events::PipelineStage;

/// What a run produced, whether it finished or not
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub statistics: RunningStatistics,
    pub history: HistorySummary,
    pub batches_total: usize,
    /// Batches folded into `statistics`
    pub batches_completed: usize,
    /// Lookup requests admitted by the governor
    pub requests_made: u32,
    pub elapsed: Duration,
}

/// Terminal state of a run
#[derive(Debug)]
pub enum RunOutcome {
    Done(RunReport),
    /// Carries whatever was accumulated before the failure
    Failed { error: CalcError, report: RunReport },
}

impl RunOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            RunOutcome::Done(report) | RunOutcome::Failed { report, .. } => report,
        }
    }

    pub fn statistics(&self) -> &RunningStatistics {
        &self.report().statistics
    }

    pub fn error(&self) -> Option<&CalcError> {
        match self {
            RunOutcome::Done(_) => None,
            RunOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            RunOutcome::Done(_) => PipelineStage::Done,
            RunOutcome::Failed { .. } => PipelineStage::Failed,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error(), Some(CalcError::Cancelled))
    }

    /// `"done"` or `"failed: <reason>"`
    pub fn describe(&self) -> String {
        match self.error() {
            None => "done".to_string(),
            Some(error) => format!("failed: {}", error.kind()),
        }
    }
}

/// Progress after one batch has been folded
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub batch_index: usize,
    pub batch_len: usize,
    pub resolved: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Requests spent on this batch, 0 if the budget was already gone
    pub attempts: u32,
    pub batches_completed: usize,
    pub batches_total: usize,
    /// Totals including this batch
    pub statistics: RunningStatistics,
}

/// Receives pipeline progress
///
/// Only `on_batch_complete` is required. Any `Fn(&BatchProgress)` closure is
/// an observer.
pub trait ProgressObserver: Send + Sync {
    fn on_stage_change(&self, _old: PipelineStage, _new: PipelineStage) {}

    fn on_resolution_started(&self, _total_videos: usize, _total_batches: usize, _workers: usize) {}

    fn on_batch_complete(&self, progress: &BatchProgress);

    fn on_run_finished(&self, _stage: PipelineStage, _statistics: &RunningStatistics) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&BatchProgress) + Send + Sync,
{
    fn on_batch_complete(&self, progress: &BatchProgress) {
        self(progress)
    }
}
