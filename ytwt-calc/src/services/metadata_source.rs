//! Video metadata source abstraction
//!
//! The pipeline talks to the metadata service only through
//! [`VideoMetadataSource`], so tests can substitute an in-memory source for
//! the YouTube client.

use crate::models::VideoId;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// API credential, never logged
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(<redacted>)")
    }
}

/// Raw metadata for one video as returned by the service
///
/// `duration` is the unparsed ISO-8601 string. Either field may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoRecord {
    pub id: String,
    pub duration: Option<String>,
    pub upload_status: Option<String>,
}

impl VideoRecord {
    pub fn new(id: impl Into<String>, duration: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            duration: Some(duration.into()),
            upload_status: Some("processed".to_string()),
        }
    }
}

/// Failure of one metadata request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Worth retrying: network trouble, 5xx, throttling
    #[error("transient service failure: {0}")]
    Transient(String),

    /// Retrying cannot help: bad credential, malformed request
    #[error("permanent service failure: {0}")]
    Permanent(String),

    /// The service reports the API quota as spent
    #[error("service quota exceeded: {0}")]
    QuotaExceeded(String),
}

/// Batch lookup of video metadata
///
/// Ids missing from the returned records are treated as deleted or private.
#[async_trait]
pub trait VideoMetadataSource: Send + Sync {
    /// Short name used in logs
    fn source_name(&self) -> &'static str;

    async fn fetch_videos(
        &self,
        ids: &[VideoId],
        token: &ApiToken,
    ) -> Result<Vec<VideoRecord>, ServiceError>;
}
