//! Pipeline progress → event bus
//!
//! [`EventBusObserver`] turns observer callbacks into [`PipelineEvent`]s on
//! the shared [`EventBus`]. [`log_pipeline_events`] is the CLI's subscriber:
//! it writes one structured log line per event until the bus closes.

use super::{BatchProgress, ProgressObserver};
use crate::models::RunningStatistics;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use ytwt_common::events::{EventBus, PipelineEvent, PipelineStage};

/// Forwards pipeline progress to an [`EventBus`]
#[derive(Clone)]
pub struct EventBusObserver {
    bus: EventBus,
}

impl EventBusObserver {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl ProgressObserver for EventBusObserver {
    fn on_stage_change(&self, old: PipelineStage, new: PipelineStage) {
        self.bus.emit_lossy(PipelineEvent::StageChanged {
            old_stage: old,
            new_stage: new,
            timestamp: Utc::now(),
        });
    }

    fn on_resolution_started(&self, total_videos: usize, total_batches: usize, workers: usize) {
        self.bus.emit_lossy(PipelineEvent::ResolutionStarted {
            total_videos,
            total_batches,
            workers,
            timestamp: Utc::now(),
        });
    }

    fn on_batch_complete(&self, progress: &BatchProgress) {
        self.bus.emit_lossy(PipelineEvent::BatchCompleted {
            batch_index: progress.batch_index,
            batches_completed: progress.batches_completed,
            batches_total: progress.batches_total,
            resolved: progress.resolved,
            deleted: progress.deleted,
            skipped: progress.skipped,
            attempts: progress.attempts,
            timestamp: Utc::now(),
        });
    }

    fn on_run_finished(&self, stage: PipelineStage, statistics: &RunningStatistics) {
        self.bus.emit_lossy(PipelineEvent::RunFinished {
            stage,
            total_seconds: statistics.total_seconds,
            total_videos: statistics.total_count,
            timestamp: Utc::now(),
        });
    }
}

/// Log every event from `rx` until the sender side is dropped
///
/// Returns the number of events logged.
pub async fn log_pipeline_events(mut rx: broadcast::Receiver<PipelineEvent>) -> usize {
    let mut logged = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                log_event(&event);
                logged += 1;
                if matches!(event, PipelineEvent::RunFinished { .. }) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Progress logger fell behind, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    logged
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageChanged {
            old_stage,
            new_stage,
            ..
        } => debug!(from = ?old_stage, to = ?new_stage, "Stage changed"),
        PipelineEvent::ResolutionStarted {
            total_videos,
            total_batches,
            workers,
            ..
        } => info!(
            videos = total_videos,
            batches = total_batches,
            workers,
            "Resolving video durations"
        ),
        PipelineEvent::BatchCompleted {
            batch_index,
            batches_completed,
            batches_total,
            resolved,
            deleted,
            skipped,
            attempts,
            ..
        } => {
            let percentage = if *batches_total == 0 {
                100.0
            } else {
                *batches_completed as f64 / *batches_total as f64 * 100.0
            };
            info!(
                batch = batch_index,
                resolved,
                deleted,
                skipped,
                attempts,
                "Progress: {}/{} batches ({:.1}%)",
                batches_completed,
                batches_total,
                percentage
            );
        }
        PipelineEvent::RunFinished {
            stage,
            total_seconds,
            total_videos,
            ..
        } => info!(stage = ?stage, total_seconds, total_videos, "Run finished"),
    }
}
