//! Error types for ytwt-calc
//!
//! Severity by variant:
//! - `InputFormat`, `Config`, `PermanentService`: fatal, abort the run
//! - `TransientService`: retried, then degraded to skipped outcomes
//! - `QuotaExceeded`: fatal or partial depending on the configured policy
//! - `MalformedRecord`: per-entry, counted and never propagated past the parser
//! - `Cancelled`: external interrupt, statistics so far are kept

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalcError {
    /// History input is not a list of records
    #[error("Input format error: {0}")]
    InputFormat(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Retryable service failure (timeout, 5xx, rate limited)
    #[error("Transient service error: {0}")]
    TransientService(String),

    /// Non-retryable service failure (bad request, invalid key)
    #[error("Permanent service error: {0}")]
    PermanentService(String),

    /// Request budget exhausted
    #[error("Request quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A single history record could not be used
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Run interrupted before all batches were admitted
    #[error("Run cancelled")]
    Cancelled,

    /// ytwt-common error (config file, snapshot I/O)
    #[error(transparent)]
    Common(#[from] ytwt_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalcError {
    /// Short machine-friendly classification used in reports and snapshots
    pub fn kind(&self) -> &'static str {
        match self {
            CalcError::InputFormat(_) => "input format",
            CalcError::Config(_) => "config",
            CalcError::TransientService(_) => "transient service",
            CalcError::PermanentService(_) => "permanent service",
            CalcError::QuotaExceeded(_) => "quota exceeded",
            CalcError::MalformedRecord(_) => "malformed record",
            CalcError::Cancelled => "cancelled",
            CalcError::Common(_) | CalcError::Io(_) => "io",
        }
    }
}

/// Result type for ytwt-calc
pub type CalcResult<T> = Result<T, CalcError>;
