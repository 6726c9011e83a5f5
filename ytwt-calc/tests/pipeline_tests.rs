//! Pipeline driver tests against an in-memory metadata source
//!
//! All tests run on a paused clock, so pacing and backoff sleeps complete
//! instantly while keeping their ordering.

mod helpers;

use helpers::{capture_logs, entry, history_of, test_config, vid, MockSource};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use ytwt_calc::config::QuotaPolicy;
use ytwt_calc::models::DateWindow;
use ytwt_calc::services::{ApiToken, ServiceError, VideoRecord};
use ytwt_calc::workflow::{BatchProgress, ProgressObserver};
use ytwt_calc::{CalcError, PipelineDriver, RunOutcome};
use ytwt_common::events::PipelineStage;
use ytwt_common::time::parse_timestamp;

fn driver(config: ytwt_calc::config::PipelineConfig, source: Arc<MockSource>) -> PipelineDriver {
    PipelineDriver::new(config, source, ApiToken::new("test-key"))
}

#[tokio::test(start_paused = true)]
async fn test_reference_scenario_totals() {
    // A 1h, B missing, C 10000s capped at 5400
    let source = Arc::new(
        MockSource::new()
            .with_video("AAAAAAAAAAA", "PT1H")
            .with_video("CCCCCCCCCCC", "PT2H46M40S"),
    );
    let history = history_of(&["AAAAAAAAAAA", "BBBBBBBBBBB", "CCCCCCCCCCC"]);

    let outcome = driver(test_config(), source.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert!(outcome.is_done(), "unexpected outcome {:?}", outcome);
    let stats = outcome.statistics();
    assert_eq!(stats.total_seconds, 9000);
    assert_eq!(stats.processed_count, 2);
    assert_eq!(stats.deleted_count, 1);
    assert_eq!(stats.skipped_count, 0);
    assert_eq!(stats.total_count, 3);
    assert_eq!(source.call_count(), 1);
    assert_eq!(outcome.report().requests_made, 1);
}

#[tokio::test(start_paused = true)]
async fn test_date_window_bounds() {
    let source = Arc::new(MockSource::new().with_video(&vid(1), "PT10S"));
    let history = json!([
        entry(&vid(1), "2023-01-01T00:00:00Z"), // == start, kept
        entry(&vid(1), "2023-06-15T08:30:00.123Z"),
        entry(&vid(1), "2024-01-01T00:00:00Z"), // == end, dropped
        entry(&vid(1), "2022-12-31T23:59:59Z"),
    ]);

    let mut config = test_config();
    config.window = DateWindow::new(
        parse_timestamp("2023-01-01T00:00:00Z").unwrap(),
        Some(parse_timestamp("2024-01-01T00:00:00Z").unwrap()),
    );

    let outcome = driver(config, source).run(&history, CancellationToken::new()).await;

    let report = outcome.report();
    assert_eq!(report.history.events, 2);
    assert_eq!(report.history.out_of_window, 2);
    assert_eq!(outcome.statistics().total_seconds, 20);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_views_each_count() {
    let id = vid(7);
    let source = Arc::new(MockSource::new().with_video(&id, "PT5M"));
    let history = history_of(&[&id, &id, &id]);

    let outcome = driver(test_config(), source).run(&history, CancellationToken::new()).await;

    assert_eq!(outcome.statistics().processed_count, 3);
    assert_eq!(outcome.statistics().total_seconds, 900);
}

#[tokio::test(start_paused = true)]
async fn test_always_transient_source_hits_attempt_cap() {
    let (logs, _guard) = capture_logs();
    let source = Arc::new(
        MockSource::new().failing_always(ServiceError::Transient("HTTP 503".into())),
    );
    let ids: Vec<String> = (0..3).map(vid).collect();
    let history = history_of(&ids);

    let mut config = test_config();
    config.batch_size = 2;
    config.backoff.max_attempts = 5;

    let outcome = driver(config, source.clone())
        .run(&history, CancellationToken::new())
        .await;

    // Two batches, five attempts each
    assert_eq!(source.call_count(), 10);
    assert!(outcome.is_done());
    let stats = outcome.statistics();
    assert_eq!(stats.skipped_count, 3);
    assert_eq!(stats.skipped_by_reason.unresolvable, 3);
    assert_eq!(stats.total_seconds, 0);
    assert!(stats.is_consistent());

    assert_eq!(logs.count_at_level(Level::WARN, "Transient lookup failure"), 10);
    logs.assert_contains("Transient service error: HTTP 503");
    logs.assert_contains("Batch unresolvable");
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success() {
    let source = Arc::new(
        MockSource::new()
            .with_video(&vid(1), "PT2M")
            .failing_first(2, ServiceError::Transient("timeout".into())),
    );
    let history = history_of(&[&vid(1)]);

    let started = tokio::time::Instant::now();
    let outcome = driver(test_config(), source.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert!(outcome.is_done());
    assert_eq!(source.call_count(), 3);
    assert_eq!(outcome.statistics().total_seconds, 120);
    // 1s then 2s of backoff
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_aborts_after_one_attempt() {
    let source = Arc::new(
        MockSource::new().failing_always(ServiceError::Permanent("HTTP 400: keyInvalid".into())),
    );
    let ids: Vec<String> = (0..120).map(vid).collect();
    let history = history_of(&ids);

    let outcome = driver(test_config(), source.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert_eq!(source.call_count(), 1);
    match &outcome {
        RunOutcome::Failed { error, report } => {
            assert!(matches!(error, CalcError::PermanentService(_)));
            assert_eq!(report.statistics.total_count, 0);
            assert_eq!(report.batches_total, 3);
            assert_eq!(report.batches_completed, 0);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_quota_exhaustion_partial_policy_finishes() {
    let mut source = MockSource::new();
    for i in 0..4 {
        source = source.with_video(&vid(i), "PT1M");
    }
    let source = Arc::new(source);
    let ids: Vec<String> = (0..4).map(vid).collect();
    let history = history_of(&ids);

    let mut config = test_config();
    config.batch_size = 1;
    config.request_budget = 2;
    config.quota_policy = QuotaPolicy::Partial;

    let outcome = driver(config, source.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert!(outcome.is_done());
    assert_eq!(source.call_count(), 2);
    let stats = outcome.statistics();
    assert_eq!(stats.processed_count, 2);
    assert_eq!(stats.skipped_by_reason.quota_exhausted, 2);
    assert_eq!(stats.total_seconds, 120);
    assert_eq!(outcome.report().batches_completed, 4);
}

#[tokio::test(start_paused = true)]
async fn test_quota_exhaustion_abort_policy_fails() {
    let mut source = MockSource::new();
    for i in 0..4 {
        source = source.with_video(&vid(i), "PT1M");
    }
    let source = Arc::new(source);
    let ids: Vec<String> = (0..4).map(vid).collect();
    let history = history_of(&ids);

    let mut config = test_config();
    config.batch_size = 1;
    config.request_budget = 2;
    config.quota_policy = QuotaPolicy::Abort;

    let outcome = driver(config, source.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert!(matches!(outcome.error(), Some(CalcError::QuotaExceeded(_))));
    assert_eq!(source.call_count(), 2);
    // Statistics up to the abort, remaining members reported as quota exhausted
    let stats = outcome.statistics();
    assert_eq!(stats.processed_count, 2);
    assert_eq!(stats.skipped_by_reason.quota_exhausted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_service_reported_quota_stops_further_requests() {
    let source = Arc::new(
        MockSource::new()
            .with_video(&vid(1), "PT1M")
            .failing_first(1, ServiceError::QuotaExceeded("quotaExceeded".into())),
    );
    let ids: Vec<String> = (0..6).map(vid).collect();
    let history = history_of(&ids);

    let mut config = test_config();
    config.batch_size = 2;
    let stages = Arc::new(StageRecorder::default());

    let outcome = driver(config, source.clone())
        .with_observer(stages.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert!(outcome.is_done());
    assert_eq!(source.call_count(), 1);
    assert_eq!(outcome.report().requests_made, 1);
    assert_eq!(outcome.statistics().skipped_by_reason.quota_exhausted, 6);

    // The refused request counts against the batch that made it
    let batches = stages.batches();
    assert_eq!(batches.len(), 3);
    for progress in &batches {
        let expected = if progress.batch_index == 0 { 1 } else { 0 };
        assert_eq!(progress.attempts, expected, "batch {}", progress.batch_index);
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_budget_makes_no_requests() {
    let source = Arc::new(MockSource::new().with_video(&vid(1), "PT1M"));
    let history = history_of(&[&vid(1), &vid(2)]);

    let mut config = test_config();
    config.request_budget = 0;

    let outcome = driver(config, source.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert_eq!(source.call_count(), 0);
    assert_eq!(outcome.statistics().skipped_by_reason.quota_exhausted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start() {
    let source = Arc::new(MockSource::new().with_video(&vid(1), "PT1M"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = driver(test_config(), source.clone())
        .run(&history_of(&[&vid(1)]), cancel)
        .await;

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.stage(), PipelineStage::Failed);
    assert_eq!(outcome.statistics().total_count, 0);
    assert_eq!(source.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_at_batch_boundary() {
    let mut source = MockSource::new();
    for i in 0..9 {
        source = source.with_video(&vid(i), "PT1M");
    }
    let source = Arc::new(source);
    let ids: Vec<String> = (0..9).map(vid).collect();
    let history = history_of(&ids);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let observer = move |_: &BatchProgress| trigger.cancel();

    let mut config = test_config();
    config.batch_size = 3;

    let outcome = driver(config, source.clone())
        .with_observer(Arc::new(observer))
        .run(&history, cancel)
        .await;

    assert!(outcome.is_cancelled());
    assert_eq!(source.call_count(), 1);
    let report = outcome.report();
    assert_eq!(report.batches_completed, 1);
    assert_eq!(report.statistics.total_count, 3);
    assert_eq!(report.statistics.total_seconds, 180);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff() {
    let source = Arc::new(
        MockSource::new().failing_always(ServiceError::Transient("HTTP 500".into())),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });

    let outcome = driver(test_config(), source.clone())
        .run(&history_of(&[&vid(1)]), cancel)
        .await;

    // Attempts at t=0 and t=1s; cancelled during the 2s backoff
    assert_eq!(source.call_count(), 2);
    assert!(outcome.is_cancelled());
    assert_eq!(outcome.report().batches_completed, 0);
    assert_eq!(outcome.statistics().total_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_pacing_wait_admits_nothing() {
    let mut catalog = MockSource::new();
    for i in 0..6 {
        catalog = catalog.with_video(&vid(i), "PT1M");
    }
    let source = Arc::new(catalog);
    let ids: Vec<String> = (0..6).map(vid).collect();

    let mut config = test_config();
    config.min_interval = Duration::from_secs(10);
    config.batch_size = 3;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let outcome = driver(config, source.clone())
        .run(&history_of(&ids), cancel)
        .await;

    // First batch at t=0; the second was still pacing when the run stopped
    assert_eq!(source.call_count(), 1);
    assert!(matches!(outcome.error(), Some(CalcError::Cancelled)));
    let report = outcome.report();
    assert_eq!(report.batches_completed, 1);
    assert_eq!(report.requests_made, 1);
    assert_eq!(report.statistics.total_count, 3);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_does_not_change_totals() {
    let mut catalog = MockSource::new();
    for i in 0..150 {
        if i % 11 == 0 {
            continue; // deleted
        }
        let duration = format!("PT{}S", (i * 97) % 7200);
        catalog = catalog.with_video(&vid(i), &duration);
    }
    let catalog = Arc::new(
        catalog
            .with_record(VideoRecord::new(vid(3), "garbage"))
            .with_latency(Duration::from_millis(250)),
    );

    let ids: Vec<String> = (0..150).map(|i| vid(i % 140)).collect();
    let history = history_of(&ids);

    let mut results = Vec::new();
    for workers in [1usize, 4] {
        let mut config = test_config();
        config.batch_size = 7;
        config.concurrency = workers;
        let outcome = driver(config, catalog.clone())
            .run(&history, CancellationToken::new())
            .await;
        assert!(outcome.is_done());
        results.push(*outcome.statistics());
    }

    assert_eq!(results[0], results[1]);
    assert!(results[0].is_consistent());
    assert_eq!(results[0].total_count, 150);
    assert!(results[0].deleted_count > 0);
    assert_eq!(results[0].skipped_by_reason.malformed, 2); // vid(3) appears twice
}

#[tokio::test(start_paused = true)]
async fn test_input_format_error_fails_in_parsing() {
    let source = Arc::new(MockSource::new());
    let stages = Arc::new(StageRecorder::default());

    let outcome = driver(test_config(), source.clone())
        .with_observer(stages.clone())
        .run(&json!({"not": "a list"}), CancellationToken::new())
        .await;

    assert!(matches!(outcome.error(), Some(CalcError::InputFormat(_))));
    assert_eq!(source.call_count(), 0);
    assert_eq!(
        stages.transitions(),
        vec![
            (PipelineStage::Idle, PipelineStage::Parsing),
            (PipelineStage::Parsing, PipelineStage::Failed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_every_stage_and_batch() {
    let mut source = MockSource::new();
    for i in 0..10 {
        source = source.with_video(&vid(i), "PT30S");
    }
    let source = Arc::new(source);
    let ids: Vec<String> = (0..10).map(vid).collect();
    let history = history_of(&ids);
    let stages = Arc::new(StageRecorder::default());

    let mut config = test_config();
    config.batch_size = 4;

    let outcome = driver(config, source)
        .with_observer(stages.clone())
        .run(&history, CancellationToken::new())
        .await;

    assert!(outcome.is_done());
    assert_eq!(
        stages.transitions(),
        vec![
            (PipelineStage::Idle, PipelineStage::Parsing),
            (PipelineStage::Parsing, PipelineStage::Batching),
            (PipelineStage::Batching, PipelineStage::Resolving),
            (PipelineStage::Resolving, PipelineStage::Aggregating),
            (PipelineStage::Aggregating, PipelineStage::Done),
        ]
    );

    let batches = stages.batches();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches.last().unwrap().batches_completed, 3);
    assert_eq!(batches.iter().map(|b| b.batch_len).sum::<usize>(), 10);
    assert_eq!(batches.last().unwrap().statistics.total_seconds, 300);
    assert_eq!(*stages.finished.lock().unwrap(), Some(PipelineStage::Done));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_implausible_durations_are_skipped() {
    let source = Arc::new(
        MockSource::new()
            .with_video(&vid(1), "PT1H")
            .with_video(&vid(2), "not-a-duration")
            .with_video(&vid(3), "P45D")
            .with_record(VideoRecord {
                id: vid(4),
                duration: Some("PT3M".into()),
                upload_status: Some("deleted".into()),
            }),
    );
    let history = history_of(&[&vid(1), &vid(2), &vid(3), &vid(4)]);

    let outcome = driver(test_config(), source).run(&history, CancellationToken::new()).await;

    let stats = outcome.statistics();
    assert_eq!(stats.processed_count, 1);
    assert_eq!(stats.skipped_by_reason.malformed, 2);
    assert_eq!(stats.deleted_count, 1);
    assert_eq!(stats.total_seconds, 3600);
}

/// Records stage transitions and batch progress
#[derive(Default)]
struct StageRecorder {
    stages: Mutex<Vec<(PipelineStage, PipelineStage)>>,
    progress: Mutex<Vec<BatchProgress>>,
    finished: Mutex<Option<PipelineStage>>,
}

impl StageRecorder {
    fn transitions(&self) -> Vec<(PipelineStage, PipelineStage)> {
        self.stages.lock().unwrap().clone()
    }

    fn batches(&self) -> Vec<BatchProgress> {
        self.progress.lock().unwrap().clone()
    }
}

impl ProgressObserver for StageRecorder {
    fn on_stage_change(&self, old: PipelineStage, new: PipelineStage) {
        self.stages.lock().unwrap().push((old, new));
    }

    fn on_batch_complete(&self, progress: &BatchProgress) {
        self.progress.lock().unwrap().push(progress.clone());
    }

    fn on_run_finished(&self, stage: PipelineStage, _statistics: &ytwt_calc::models::RunningStatistics) {
        *self.finished.lock().unwrap() = Some(stage);
    }
}
