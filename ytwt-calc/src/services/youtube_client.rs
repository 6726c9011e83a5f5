//! YouTube Data API v3 client
//!
//! Looks up up to 50 videos per `videos.list` request, asking for the
//! `contentDetails` (duration) and `status` (upload status) parts.

use super::metadata_source::{ApiToken, ServiceError, VideoMetadataSource, VideoRecord};
use crate::error::{CalcError, CalcResult};
use crate::models::VideoId;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use ytwt_common::config::get_user_agent;

pub const YOUTUBE_VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Server-side limit on ids per `videos.list` call
pub const MAX_IDS_PER_REQUEST: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    content_details: Option<ContentDetails>,
    status: Option<VideoStatus>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus {
    upload_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

impl From<VideoItem> for VideoRecord {
    fn from(item: VideoItem) -> Self {
        VideoRecord {
            id: item.id,
            duration: item.content_details.and_then(|c| c.duration),
            upload_status: item.status.and_then(|s| s.upload_status),
        }
    }
}

/// YouTube Data API client
pub struct YouTubeClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl YouTubeClient {
    pub fn new() -> CalcResult<Self> {
        Self::with_endpoint(YOUTUBE_VIDEOS_URL)
    }

    /// Client against a different `videos` endpoint (test servers)
    pub fn with_endpoint(endpoint: impl Into<String>) -> CalcResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CalcError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl VideoMetadataSource for YouTubeClient {
    fn source_name(&self) -> &'static str {
        "youtube"
    }

    async fn fetch_videos(
        &self,
        ids: &[VideoId],
        token: &ApiToken,
    ) -> Result<Vec<VideoRecord>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_IDS_PER_REQUEST {
            return Err(ServiceError::Permanent(format!(
                "{} ids in one request (max {})",
                ids.len(),
                MAX_IDS_PER_REQUEST
            )));
        }

        let id_list = ids
            .iter()
            .map(VideoId::as_str)
            .collect::<Vec<_>>()
            .join(",");

        tracing::debug!(ids = ids.len(), "Querying YouTube videos.list");

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("part", "contentDetails,status"),
                ("id", id_list.as_str()),
                ("maxResults", "50"),
                ("key", token.expose()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transient(format!("reading response body: {}", e.without_url())))?;

        if !status.is_success() {
            return Err(classify_api_error(status, &body));
        }

        // A 200 can still carry an error object
        if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(&body) {
            let code = StatusCode::from_u16(envelope.error.code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Err(classify_api_error(code, &body));
        }

        let list: VideoListResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::Transient(format!("undecodable response: {}", e)))?;

        Ok(list.items.into_iter().map(VideoRecord::from).collect())
    }
}

/// The request URL carries the API key, so it is stripped from the message
fn map_transport_error(e: reqwest::Error) -> ServiceError {
    let e = e.without_url();
    if e.is_builder() {
        ServiceError::Permanent(format!("invalid request: {}", e))
    } else {
        ServiceError::Transient(format!("network error: {}", e))
    }
}

/// Map an error status and body to a [`ServiceError`]
///
/// 5xx and 429 are transient. 403 is split by the reported reason: quota
/// reasons end the run's budget, rate-limit reasons are transient, anything
/// else (bad key, forbidden) is permanent. Other 4xx are permanent.
pub(crate) fn classify_api_error(status: StatusCode, body: &str) -> ServiceError {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error)
        .unwrap_or_default();
    let reasons: Vec<&str> = parsed.errors.iter().map(|d| d.reason.as_str()).collect();
    let detail = if parsed.message.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), parsed.message)
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return ServiceError::Transient(detail);
    }

    if status == StatusCode::FORBIDDEN {
        if reasons
            .iter()
            .any(|r| matches!(*r, "quotaExceeded" | "dailyLimitExceeded"))
        {
            return ServiceError::QuotaExceeded(detail);
        }
        if reasons
            .iter()
            .any(|r| matches!(*r, "rateLimitExceeded" | "userRateLimitExceeded"))
        {
            return ServiceError::Transient(detail);
        }
    }

    ServiceError::Permanent(detail)
}
