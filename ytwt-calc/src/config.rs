//! Run configuration for ytwt-calc
//!
//! Settings are resolved per key with CLI → ENV → TOML → compiled default
//! priority (see [`ytwt_common::config::resolve_setting`]) and then
//! validated as a whole before the pipeline starts.

use crate::error::{CalcError, CalcResult};
use crate::models::DateWindow;
use crate::services::metadata_source::ApiToken;
use crate::services::rate_governor::request_budget;
use crate::services::youtube_client::MAX_IDS_PER_REQUEST;
use crate::utils::BackoffPolicy;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use ytwt_common::config::{resolve_setting, TomlConfig};
use ytwt_common::time::{millis_to_duration, parse_date_bound};

pub const DEFAULT_START_DATE: &str = "2000-01-01";
/// 90 minutes
pub const DEFAULT_MAX_DURATION_SECS: u64 = 5400;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_QUOTA_UNITS: u32 = 10_000;
pub const DEFAULT_COST_PER_REQUEST: u32 = 1;
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 100;

pub const ENV_API_KEY: &str = "YOUTUBE_API_KEY";

/// Takeout export names checked first, in order
const HISTORY_FILE_NAMES: [&str; 6] = [
    "watch-history.json",
    "watch_history.json",
    "youtube-history.json",
    "youtube_history.json",
    "takeout-history.json",
    "my-watch-history.json",
];

/// Placeholder shipped in sample configs
const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY";

/// What to do when the request budget runs out mid-run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaPolicy {
    /// End the run as failed
    Abort,
    /// Finish with the batches resolved so far
    #[default]
    Partial,
}

impl FromStr for QuotaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(QuotaPolicy::Abort),
            "partial" => Ok(QuotaPolicy::Partial),
            other => Err(format!("unknown quota policy {:?} (expected abort or partial)", other)),
        }
    }
}

impl fmt::Display for QuotaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuotaPolicy::Abort => "abort",
            QuotaPolicy::Partial => "partial",
        })
    }
}

/// Everything the pipeline driver needs besides the source and token
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub window: DateWindow,
    /// Per-view contribution cap
    pub max_duration_secs: u64,
    pub batch_size: usize,
    /// Concurrent batch workers
    pub concurrency: usize,
    /// Lookup requests allowed this run
    pub request_budget: u32,
    pub min_interval: Duration,
    pub backoff: BackoffPolicy,
    pub quota_policy: QuotaPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let start = parse_date_bound(DEFAULT_START_DATE).unwrap_or_default();
        Self {
            window: DateWindow::new(start, None),
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            request_budget: request_budget(DEFAULT_QUOTA_UNITS, DEFAULT_COST_PER_REQUEST),
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            backoff: BackoffPolicy::default(),
            quota_policy: QuotaPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> CalcResult<()> {
        if self.batch_size == 0 || self.batch_size > MAX_IDS_PER_REQUEST {
            return Err(CalcError::Config(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_IDS_PER_REQUEST, self.batch_size
            )));
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(CalcError::Config(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }
        if self.backoff.max_attempts == 0 {
            return Err(CalcError::Config("max attempts must be at least 1".to_string()));
        }
        if self.backoff.base_delay > self.backoff.max_delay {
            return Err(CalcError::Config(format!(
                "base delay {:?} exceeds max delay {:?}",
                self.backoff.base_delay, self.backoff.max_delay
            )));
        }
        if self.max_duration_secs == 0 {
            return Err(CalcError::Config("max duration must be positive".to_string()));
        }
        if let Some(end) = self.window.end {
            if end <= self.window.start {
                return Err(CalcError::Config(format!(
                    "end date {} is not after start date {}",
                    end, self.window.start
                )));
            }
        }
        Ok(())
    }
}

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub history_file: Option<PathBuf>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub max_duration: Option<u64>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub quota_units: Option<u32>,
    pub cost_per_request: Option<u32>,
    pub min_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub quota_policy: Option<QuotaPolicy>,
    pub output: Option<PathBuf>,
}

/// Fully resolved and validated settings for one run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub api_token: ApiToken,
    pub history_file: PathBuf,
    pub output: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    /// Raw start bound as given, for the snapshot
    pub start_date: String,
    pub end_date: Option<String>,
}

/// Resolve every setting and validate the result
///
/// `search_dir` is scanned for a history file when none is configured.
pub fn resolve_run_settings(
    cli: ConfigOverrides,
    toml: &TomlConfig,
    search_dir: &Path,
) -> CalcResult<RunSettings> {
    let api_token = resolve_api_key(cli.api_key, toml)?;

    let history_file = match resolve_setting(
        "history file",
        cli.history_file,
        "YTWT_HISTORY_FILE",
        toml.history_file.clone(),
    )? {
        Some(path) => path,
        None => discover_history_files(search_dir)
            .into_iter()
            .next()
            .ok_or_else(|| {
                CalcError::Config(format!(
                    "no history file given and none found in {}",
                    search_dir.display()
                ))
            })?,
    };
    if !history_file.exists() {
        return Err(CalcError::Config(format!(
            "history file not found: {}",
            history_file.display()
        )));
    }

    let start_date = resolve_setting(
        "start date",
        cli.start_date,
        "YTWT_START_DATE",
        toml.start_date.clone(),
    )?
    .unwrap_or_else(|| DEFAULT_START_DATE.to_string());
    let end_date = resolve_setting("end date", cli.end_date, "YTWT_END_DATE", toml.end_date.clone())?;

    let start = parse_date_bound(&start_date)
        .map_err(|e| CalcError::Config(format!("start date: {}", e)))?;
    let end = end_date
        .as_deref()
        .map(parse_date_bound)
        .transpose()
        .map_err(|e| CalcError::Config(format!("end date: {}", e)))?;

    let quota_units = resolve_setting("quota units", cli.quota_units, "YTWT_QUOTA_UNITS", toml.quota_units)?
        .unwrap_or(DEFAULT_QUOTA_UNITS);
    let cost_per_request = resolve_setting(
        "cost per request",
        cli.cost_per_request,
        "YTWT_COST_PER_REQUEST",
        toml.cost_per_request,
    )?
    .unwrap_or(DEFAULT_COST_PER_REQUEST);
    if cost_per_request == 0 {
        return Err(CalcError::Config("cost per request must be at least 1".to_string()));
    }

    let defaults = BackoffPolicy::default();
    let backoff = BackoffPolicy {
        max_attempts: resolve_setting("max attempts", cli.max_attempts, "YTWT_MAX_ATTEMPTS", toml.max_attempts)?
            .unwrap_or(defaults.max_attempts),
        base_delay: resolve_setting("base delay", cli.base_delay_ms, "YTWT_BASE_DELAY_MS", toml.base_delay_ms)?
            .map_or(defaults.base_delay, millis_to_duration),
        max_delay: resolve_setting("max delay", cli.max_delay_ms, "YTWT_MAX_DELAY_MS", toml.max_delay_ms)?
            .map_or(defaults.max_delay, millis_to_duration),
    };

    let toml_policy = toml
        .quota_policy
        .as_deref()
        .map(QuotaPolicy::from_str)
        .transpose()
        .map_err(|e| CalcError::Config(format!("quota_policy in TOML: {}", e)))?;

    let pipeline = PipelineConfig {
        window: DateWindow::new(start, end),
        max_duration_secs: resolve_setting("max duration", cli.max_duration, "YTWT_MAX_DURATION", toml.max_duration)?
            .unwrap_or(DEFAULT_MAX_DURATION_SECS),
        batch_size: resolve_setting("batch size", cli.batch_size, "YTWT_BATCH_SIZE", toml.batch_size)?
            .unwrap_or(DEFAULT_BATCH_SIZE),
        concurrency: resolve_setting("concurrency", cli.concurrency, "YTWT_CONCURRENCY", toml.concurrency)?
            .unwrap_or(DEFAULT_CONCURRENCY),
        request_budget: request_budget(quota_units, cost_per_request),
        min_interval: resolve_setting("min interval", cli.min_interval_ms, "YTWT_MIN_INTERVAL_MS", toml.min_interval_ms)?
            .map_or(millis_to_duration(DEFAULT_MIN_INTERVAL_MS), millis_to_duration),
        backoff,
        quota_policy: resolve_setting("quota policy", cli.quota_policy, "YTWT_QUOTA_POLICY", toml_policy)?
            .unwrap_or_default(),
    };
    pipeline.validate()?;

    if pipeline.request_budget == 0 {
        warn!(quota_units, cost_per_request, "Request budget is zero, every batch will be skipped");
    }

    let output = resolve_setting("output", cli.output, "YTWT_OUTPUT", toml.output.clone())?;

    Ok(RunSettings {
        api_token,
        history_file,
        output,
        pipeline,
        start_date,
        end_date,
    })
}

fn is_valid_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != PLACEHOLDER_API_KEY
}

/// Resolve the API key from CLI → ENV → TOML
///
/// Blank and placeholder values are ignored at every tier.
fn resolve_api_key(cli_key: Option<String>, toml: &TomlConfig) -> CalcResult<ApiToken> {
    let env_key = std::env::var(ENV_API_KEY).ok();
    let candidates = [
        ("command line", cli_key),
        ("environment", env_key),
        ("TOML", toml.api_key.clone()),
    ];

    let valid: Vec<_> = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)))
        .collect();

    if valid.len() > 1 {
        let sources: Vec<&str> = valid.iter().map(|(s, _)| *s).collect();
        info!(
            "API key found in multiple sources: {}. Using {}.",
            sources.join(", "),
            sources[0]
        );
    }

    match valid.into_iter().next() {
        Some((source, key)) => {
            info!(source, "YouTube API key loaded");
            Ok(ApiToken::new(key.trim()))
        }
        None => Err(CalcError::Config(format!(
            "YouTube API key not configured. Use --api-key, the {} environment variable, \
             or api_key in the TOML config",
            ENV_API_KEY
        ))),
    }
}

/// Likely watch-history exports in `dir`
///
/// Well-known Takeout names come first, then any other `*.json` whose name
/// contains "history", sorted by name.
pub fn discover_history_files(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = HISTORY_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| path.is_file())
        .collect();

    let mut extra: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.to_ascii_lowercase().contains("history"))
            })
            .filter(|path| !found.contains(path))
            .collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot scan for history files");
            Vec::new()
        }
    };
    extra.sort();
    found.extend(extra);
    found
}
