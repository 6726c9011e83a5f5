//! Pipeline driver
//!
//! Runs one watch-time calculation: parse the history, batch the ids, resolve
//! batches through a bounded worker pool and fold the outcomes.
//!
//! # Resolution loop
//!
//! Each batch is admitted by the shared [`RateGovernor`], looked up once, and
//! retried with exponential backoff while the failure is transient. After
//! `max_attempts` transient failures every member is skipped as
//! unresolvable. A permanent failure stops admission and fails the run. Once
//! the budget is spent, every remaining batch is folded as quota-exhausted.
//!
//! # Cancellation
//!
//! Cancelling the token stops admission of new batches and interrupts
//! pacing waits and backoff sleeps. Requests already in flight complete and are folded.

use super::{BatchProgress, ProgressObserver, RunOutcome, RunReport};
use crate::config::{PipelineConfig, QuotaPolicy};
use crate::error::CalcError;
use crate::models::{LookupOutcome, RunningStatistics, SkipReason};
use crate::services::accumulator::Accumulator;
use crate::services::batcher::{make_batches, Batch};
use crate::services::history_parser::parse_history;
use crate::services::metadata_resolver::{BatchResolution, MetadataResolver};
use crate::services::metadata_source::{ApiToken, VideoMetadataSource};
use crate::services::rate_governor::RateGovernor;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ytwt_common::events::PipelineStage;

/// How one batch left the resolution loop
enum BatchDisposition {
    /// Outcomes to fold; `attempts` requests were spent
    Completed {
        outcomes: Vec<LookupOutcome>,
        attempts: u32,
    },
    /// Budget gone before or during this batch
    QuotaExhausted { attempts: u32, reason: String },
    /// Run must stop
    Fatal(CalcError),
    /// Not admitted, or abandoned during backoff, because the run is stopping
    Interrupted,
}

/// Totals from the resolving stage
struct ResolutionSummary {
    statistics: RunningStatistics,
    batches_completed: usize,
    requests_made: u32,
    fatal: Option<CalcError>,
    quota_hit: bool,
}

/// Tracks the current stage and reports every transition
struct StageTracker<'a> {
    current: PipelineStage,
    observer: Option<&'a dyn ProgressObserver>,
}

impl<'a> StageTracker<'a> {
    fn new(observer: Option<&'a dyn ProgressObserver>) -> Self {
        Self {
            current: PipelineStage::Idle,
            observer,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        let old = self.current;
        self.current = next;
        info!(from = ?old, to = ?next, "Pipeline stage changed");
        if let Some(observer) = self.observer {
            observer.on_stage_change(old, next);
        }
    }
}

/// Orchestrates one run against a metadata source
pub struct PipelineDriver {
    config: PipelineConfig,
    source: Arc<dyn VideoMetadataSource>,
    token: ApiToken,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig, source: Arc<dyn VideoMetadataSource>, token: ApiToken) -> Self {
        Self {
            config,
            source,
            token,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline over a decoded history document
    pub async fn run(&self, history: &Value, cancel: CancellationToken) -> RunOutcome {
        let started = Instant::now();
        let mut stage = StageTracker::new(self.observer.as_deref());
        let mut report = RunReport::default();

        if cancel.is_cancelled() {
            return self.fail(&mut stage, CalcError::Cancelled, report, started);
        }

        stage.advance(PipelineStage::Parsing);
        let parsed = match parse_history(history, &self.config.window) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail(&mut stage, e, report, started),
        };
        report.history = parsed.summary;

        stage.advance(PipelineStage::Batching);
        let video_ids = parsed.video_ids();
        let batches = match make_batches(&video_ids, self.config.batch_size) {
            Ok(batches) => batches,
            Err(e) => return self.fail(&mut stage, e, report, started),
        };
        report.batches_total = batches.len();

        if cancel.is_cancelled() {
            return self.fail(&mut stage, CalcError::Cancelled, report, started);
        }

        stage.advance(PipelineStage::Resolving);
        let summary = self.resolve_all(batches, video_ids.len(), &cancel).await;
        report.statistics = summary.statistics;
        report.batches_completed = summary.batches_completed;
        report.requests_made = summary.requests_made;

        if let Some(error) = summary.fatal {
            return self.fail(&mut stage, error, report, started);
        }
        if cancel.is_cancelled() && report.batches_completed < report.batches_total {
            warn!(
                completed = report.batches_completed,
                total = report.batches_total,
                "Run cancelled before all batches were resolved"
            );
            return self.fail(&mut stage, CalcError::Cancelled, report, started);
        }
        if summary.quota_hit && self.config.quota_policy == QuotaPolicy::Abort {
            let error = CalcError::QuotaExceeded(format!(
                "request budget of {} exhausted after {} requests",
                self.config.request_budget, report.requests_made
            ));
            return self.fail(&mut stage, error, report, started);
        }

        stage.advance(PipelineStage::Aggregating);
        if !report.statistics.is_consistent() {
            warn!(stats = ?report.statistics, "Statistics counters do not add up");
        }

        report.elapsed = started.elapsed();
        stage.advance(PipelineStage::Done);
        info!(
            total_seconds = report.statistics.total_seconds,
            videos = report.statistics.total_count,
            requests = report.requests_made,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Watch-time calculation complete"
        );
        self.notify_finished(PipelineStage::Done, &report.statistics);
        RunOutcome::Done(report)
    }

    fn fail(
        &self,
        stage: &mut StageTracker<'_>,
        error: CalcError,
        mut report: RunReport,
        started: Instant,
    ) -> RunOutcome {
        report.elapsed = started.elapsed();
        error!(kind = error.kind(), error = %error, "Pipeline failed");
        stage.advance(PipelineStage::Failed);
        self.notify_finished(PipelineStage::Failed, &report.statistics);
        RunOutcome::Failed { error, report }
    }

    fn notify_finished(&self, stage: PipelineStage, statistics: &RunningStatistics) {
        if let Some(observer) = &self.observer {
            observer.on_run_finished(stage, statistics);
        }
    }

    /// Resolve every batch with at most `concurrency` in flight
    async fn resolve_all(
        &self,
        batches: Vec<Batch>,
        total_videos: usize,
        cancel: &CancellationToken,
    ) -> ResolutionSummary {
        let governor = Arc::new(RateGovernor::new(
            self.config.min_interval,
            self.config.request_budget,
        ));
        let resolver = MetadataResolver::new(self.source.clone(), governor.clone(), self.token.clone());
        let accumulator = Accumulator::new(self.config.max_duration_secs);
        // Internal stop signal; also fires on external cancellation
        let halt = cancel.child_token();
        let fatal: Mutex<Option<CalcError>> = Mutex::new(None);
        let quota_hit = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);
        let batches_total = batches.len();
        let workers = self.config.concurrency.max(1);

        info!(
            videos = total_videos,
            batches = batches_total,
            workers,
            budget = self.config.request_budget,
            source = self.source.source_name(),
            "Starting duration resolution"
        );
        if let Some(observer) = &self.observer {
            observer.on_resolution_started(total_videos, batches_total, workers);
        }

        let resolver = &resolver;
        let accumulator = &accumulator;
        let halt = &halt;
        let fatal = &fatal;
        let quota_hit = &quota_hit;
        let completed = &completed;

        stream::iter(batches)
            .map(move |batch| async move {
                let (outcomes, attempts) = match self.resolve_with_retry(resolver, &batch, halt).await {
                    BatchDisposition::Completed { outcomes, attempts } => (outcomes, attempts),
                    BatchDisposition::QuotaExhausted { attempts, reason } => {
                        if !quota_hit.swap(true, Ordering::SeqCst) {
                            warn!(
                                batch = batch.index,
                                reason = %reason,
                                policy = %self.config.quota_policy,
                                "Request quota exhausted, remaining batches will be skipped"
                            );
                        }
                        let skipped = batch
                            .video_ids
                            .iter()
                            .map(|id| LookupOutcome::skipped(id.clone(), SkipReason::QuotaExhausted))
                            .collect();
                        (skipped, attempts)
                    }
                    BatchDisposition::Fatal(e) => {
                        error!(batch = batch.index, error = %e, "Batch failed permanently, stopping");
                        let mut slot = fatal.lock().unwrap_or_else(PoisonError::into_inner);
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        halt.cancel();
                        return;
                    }
                    BatchDisposition::Interrupted => {
                        debug!(batch = batch.index, "Batch not resolved, run is stopping");
                        return;
                    }
                };

                let statistics = accumulator.fold_all(&outcomes);
                let batches_completed = completed.fetch_add(1, Ordering::SeqCst) + 1;
                self.report_batch(&batch, &outcomes, attempts, batches_completed, batches_total, statistics);
            })
            .buffer_unordered(workers)
            .collect::<Vec<()>>()
            .await;

        let fatal = fatal.lock().unwrap_or_else(PoisonError::into_inner).take();
        ResolutionSummary {
            statistics: accumulator.snapshot(),
            batches_completed: completed.load(Ordering::SeqCst),
            requests_made: governor.admitted().await,
            fatal,
            quota_hit: quota_hit.load(Ordering::SeqCst),
        }
    }

    /// Resolve one batch, retrying transient failures with backoff
    async fn resolve_with_retry(
        &self,
        resolver: &MetadataResolver,
        batch: &Batch,
        halt: &CancellationToken,
    ) -> BatchDisposition {
        let policy = self.config.backoff;
        let mut last_error = None;

        for attempt in 0..policy.max_attempts {
            if halt.is_cancelled() {
                return BatchDisposition::Interrupted;
            }

            if attempt > 0 {
                let delay = policy.delay_for_retry(attempt - 1);
                debug!(batch = batch.index, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::select! {
                    _ = halt.cancelled() => return BatchDisposition::Interrupted,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match resolver.resolve(batch, halt).await {
                BatchResolution::Resolved(outcomes) => {
                    return BatchDisposition::Completed {
                        outcomes,
                        attempts: attempt + 1,
                    };
                }
                BatchResolution::TransientFailure(reason) => {
                    let error = CalcError::TransientService(reason);
                    warn!(
                        batch = batch.index,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        "Transient lookup failure: {}",
                        error
                    );
                    last_error = Some(error);
                }
                BatchResolution::PermanentFailure(reason) => {
                    return BatchDisposition::Fatal(CalcError::PermanentService(reason));
                }
                BatchResolution::QuotaExhausted { reason, charged } => {
                    return BatchDisposition::QuotaExhausted {
                        attempts: attempt + u32::from(charged),
                        reason,
                    };
                }
                BatchResolution::Interrupted => return BatchDisposition::Interrupted,
            }
        }

        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!(
            batch = batch.index,
            videos = batch.len(),
            attempts = policy.max_attempts,
            last_error = %last_error,
            "Batch unresolvable, skipping its videos"
        );
        let outcomes = batch
            .video_ids
            .iter()
            .map(|id| LookupOutcome::skipped(id.clone(), SkipReason::Unresolvable))
            .collect();
        BatchDisposition::Completed {
            outcomes,
            attempts: policy.max_attempts,
        }
    }

    fn report_batch(
        &self,
        batch: &Batch,
        outcomes: &[LookupOutcome],
        attempts: u32,
        batches_completed: usize,
        batches_total: usize,
        statistics: RunningStatistics,
    ) {
        let mut progress = BatchProgress {
            batch_index: batch.index,
            batch_len: batch.len(),
            resolved: 0,
            deleted: 0,
            skipped: 0,
            attempts,
            batches_completed,
            batches_total,
            statistics,
        };
        for outcome in outcomes {
            match outcome {
                LookupOutcome::Resolved { .. } => progress.resolved += 1,
                LookupOutcome::Deleted { .. } => progress.deleted += 1,
                LookupOutcome::Skipped { .. } => progress.skipped += 1,
            }
        }

        debug!(
            batch = batch.index,
            resolved = progress.resolved,
            deleted = progress.deleted,
            skipped = progress.skipped,
            "Batch folded ({}/{})",
            batches_completed,
            batches_total
        );
        if let Some(observer) = &self.observer {
            observer.on_batch_complete(&progress);
        }
    }
}
