//! Configuration file loading and setting resolution
//!
//! Every setting is resolved in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback, applied by the caller)
//!
//! A missing TOML file is never fatal; an unreadable or unparseable one is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. "info" or "ytwt_calc=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Contents of `ytwt-calc.toml`
///
/// All keys are optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// YouTube Data API v3 key
    pub api_key: Option<String>,
    /// Path to the exported `watch-history.json`
    pub history_file: Option<PathBuf>,
    /// Inclusive lower date bound (`YYYY-MM-DD` or RFC 3339)
    pub start_date: Option<String>,
    /// Exclusive upper date bound (`YYYY-MM-DD` or RFC 3339)
    pub end_date: Option<String>,
    /// Per-view duration cap in seconds
    pub max_duration: Option<u64>,
    /// Video ids per lookup request
    pub batch_size: Option<usize>,
    /// Concurrent batch workers
    pub concurrency: Option<usize>,
    /// Daily quota units available to this run
    pub quota_units: Option<u32>,
    /// Quota units charged per lookup request
    pub cost_per_request: Option<u32>,
    /// Minimum spacing between requests, milliseconds
    pub min_interval_ms: Option<u64>,
    /// Attempts per batch before giving up
    pub max_attempts: Option<u32>,
    /// First retry backoff, milliseconds
    pub base_delay_ms: Option<u64>,
    /// Backoff ceiling, milliseconds
    pub max_delay_ms: Option<u64>,
    /// "abort" or "partial"
    pub quota_policy: Option<String>,
    /// Snapshot output path
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }
}

/// Default TOML location: `<config dir>/ytwt/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ytwt").join(format!("{}.toml", module_name)))
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
    TomlConfig::from_toml_str(&content)
}

/// Load the config file for a module, tolerating absence
///
/// An explicitly requested file must exist. The default location may be
/// missing, in which case an empty config is returned.
pub fn load_module_config(explicit: Option<&Path>, module_name: &str) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("Loading configuration from {}", path.display());
        return load_toml_config(path);
    }

    match default_config_path(module_name) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        Some(path) => {
            debug!("No config file at {}, using defaults", path.display());
            Ok(TomlConfig::default())
        }
        None => {
            debug!("Could not determine config directory, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve one setting from CLI → ENV → TOML
///
/// Returns `Ok(None)` when no tier supplies a value; the caller applies the
/// compiled default. An environment value that fails to parse is an error
/// rather than being silently skipped.
pub fn resolve_setting<T>(
    name: &str,
    cli_value: Option<T>,
    env_var_name: &str,
    toml_value: Option<T>,
) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli_value {
        debug!(setting = name, "Using command-line value");
        return Ok(Some(value));
    }

    if let Ok(raw) = std::env::var(env_var_name) {
        if !raw.trim().is_empty() {
            let value = raw.trim().parse::<T>().map_err(|e| {
                Error::Config(format!("{}={:?} is not a valid {}: {}", env_var_name, raw, name, e))
            })?;
            debug!(setting = name, env = env_var_name, "Using environment value");
            return Ok(Some(value));
        }
    }

    if toml_value.is_some() {
        debug!(setting = name, "Using TOML value");
    }
    Ok(toml_value)
}

/// Standard User-Agent for outbound HTTP requests
pub fn get_user_agent() -> String {
    format!("ytwt/{} (watch-time calculator)", env!("CARGO_PKG_VERSION"))
}
