//! Pipeline progress events and the broadcast event bus
//!
//! The pipeline emits events without knowing who listens; the CLI subscribes
//! and turns them into log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pipeline driver stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineStage {
    /// Created, nothing run yet
    Idle,
    /// Converting raw history records into watch events
    Parsing,
    /// Splitting video ids into lookup batches
    Batching,
    /// Looking up batches against the metadata service
    Resolving,
    /// Finalizing statistics
    Aggregating,
    /// Finished with complete (or policy-accepted partial) statistics
    Done,
    /// Aborted; statistics are partial
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Driver moved between stages
    StageChanged {
        old_stage: PipelineStage,
        new_stage: PipelineStage,
        timestamp: DateTime<Utc>,
    },

    /// Resolution is about to start
    ResolutionStarted {
        total_videos: usize,
        total_batches: usize,
        workers: usize,
        timestamp: DateTime<Utc>,
    },

    /// One batch has been folded into the running statistics
    BatchCompleted {
        batch_index: usize,
        batches_completed: usize,
        batches_total: usize,
        resolved: usize,
        deleted: usize,
        skipped: usize,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Driver reached a terminal stage
    RunFinished {
        stage: PipelineStage,
        total_seconds: u64,
        total_videos: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`PipelineEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
