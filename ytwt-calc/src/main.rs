//! ytwt-calc - YouTube watch-time calculator
//!
//! Reads a Google Takeout `watch-history.json`, looks up every watched video's
//! duration through the YouTube Data API and prints the total watch time.
//!
//! Exit codes: 0 finished, 1 failed, 130 interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytwt_calc::config::{resolve_run_settings, ConfigOverrides, QuotaPolicy};
use ytwt_calc::report::{ReportFormatter, SnapshotParameters, WatchTimeSnapshot};
use ytwt_calc::services::{load_history_file, YouTubeClient};
use ytwt_calc::workflow::event_bridge::log_pipeline_events;
use ytwt_calc::workflow::{EventBusObserver, PipelineDriver};
use ytwt_common::config::load_module_config;
use ytwt_common::events::EventBus;

const MODULE_NAME: &str = "ytwt-calc";

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", ",
    env!("BUILD_PROFILE"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Command-line arguments for ytwt-calc
#[derive(Parser, Debug)]
#[command(name = "ytwt-calc")]
#[command(about = "Calculate total YouTube watch time from a Takeout watch history")]
#[command(version, long_version = LONG_VERSION)]
struct Args {
    /// YouTube Data API v3 key (also YOUTUBE_API_KEY)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Path to watch-history.json (searched in the current directory if omitted)
    #[arg(short = 'f', long, value_name = "FILE")]
    history_file: Option<PathBuf>,

    /// Start date, YYYY-MM-DD or RFC 3339 (default 2000-01-01)
    #[arg(short = 's', long)]
    start_date: Option<String>,

    /// End date (exclusive), YYYY-MM-DD or RFC 3339
    #[arg(short = 'e', long)]
    end_date: Option<String>,

    /// Maximum seconds counted per view (default 5400)
    #[arg(short = 'd', long, value_name = "SECONDS")]
    max_duration: Option<u64>,

    /// Video ids per API request, 1-50
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,

    /// Concurrent batch workers
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Daily quota units available to this run
    #[arg(long)]
    quota_units: Option<u32>,

    /// Quota units charged per request
    #[arg(long)]
    cost_per_request: Option<u32>,

    /// Minimum milliseconds between requests
    #[arg(long, value_name = "MS")]
    min_interval_ms: Option<u64>,

    /// Attempts per batch before its videos are skipped
    #[arg(long)]
    max_attempts: Option<u32>,

    /// First retry delay in milliseconds
    #[arg(long, value_name = "MS")]
    base_delay_ms: Option<u64>,

    /// Retry delay ceiling in milliseconds
    #[arg(long, value_name = "MS")]
    max_delay_ms: Option<u64>,

    /// On quota exhaustion: abort, or finish with partial results
    #[arg(long, value_name = "abort|partial")]
    quota_policy: Option<QuotaPolicy>,

    /// Write a JSON snapshot of the results
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// TOML config file
    #[arg(short = 'c', long, env = "YTWT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_key: self.api_key.clone(),
            history_file: self.history_file.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            max_duration: self.max_duration,
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            quota_units: self.quota_units,
            cost_per_request: self.cost_per_request,
            min_interval_ms: self.min_interval_ms,
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            quota_policy: self.quota_policy,
            output: self.output.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let toml_config = load_module_config(args.config.as_deref(), MODULE_NAME)
        .context("Failed to load configuration file")?;

    let default_filter = if args.verbose {
        "ytwt_calc=debug,ytwt_common=debug,info".to_string()
    } else {
        toml_config.logging.level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ytwt-calc {}", LONG_VERSION);

    let search_dir = std::env::current_dir().context("Cannot determine current directory")?;
    let settings = resolve_run_settings(args.overrides(), &toml_config, &search_dir)
        .context("Invalid configuration")?;

    info!(
        history_file = %settings.history_file.display(),
        start = %settings.start_date,
        end = settings.end_date.as_deref().unwrap_or("-"),
        max_duration = settings.pipeline.max_duration_secs,
        batch_size = settings.pipeline.batch_size,
        concurrency = settings.pipeline.concurrency,
        quota_policy = %settings.pipeline.quota_policy,
        "Configuration resolved"
    );

    let history = load_history_file(&settings.history_file)
        .with_context(|| format!("Failed to read {}", settings.history_file.display()))?;

    let client = YouTubeClient::new().context("Failed to build YouTube client")?;

    let event_bus = EventBus::new(100);
    let logger = tokio::spawn(log_pipeline_events(event_bus.subscribe()));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight requests");
                cancel.cancel();
            }
        });
    }

    let driver = PipelineDriver::new(
        settings.pipeline.clone(),
        Arc::new(client),
        settings.api_token.clone(),
    )
    .with_observer(Arc::new(EventBusObserver::new(event_bus.clone())));

    let outcome = driver.run(&history, cancel).await;

    drop(driver);
    drop(event_bus);
    let _ = logger.await;

    println!("{}", ReportFormatter::format(&outcome));

    if let Some(path) = &settings.output {
        let snapshot = WatchTimeSnapshot::new(&outcome, SnapshotParameters::from_settings(&settings));
        match snapshot.export_json(path) {
            Ok(()) => info!(path = %path.display(), "Results saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save results"),
        }
    }

    Ok(if outcome.is_done() {
        ExitCode::SUCCESS
    } else if outcome.is_cancelled() {
        ExitCode::from(130)
    } else {
        ExitCode::FAILURE
    })
}
