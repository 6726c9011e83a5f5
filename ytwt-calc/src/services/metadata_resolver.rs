//! Batch metadata resolution
//!
//! Performs exactly one governed request for a batch and classifies every
//! requested id into a [`LookupOutcome`]. Retrying is the caller's job.

use super::batcher::Batch;
use super::metadata_source::{ApiToken, ServiceError, VideoMetadataSource, VideoRecord};
use super::rate_governor::{AdmissionError, RateGovernor};
use crate::models::{LookupOutcome, SkipReason, VideoId};
use crate::utils::parse_iso8601_duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Durations above this are treated as bogus (30 days)
pub const MAX_PLAUSIBLE_DURATION_SECS: u64 = 30 * 86_400;

/// Upload states that mean the video is gone
const UNAVAILABLE_UPLOAD_STATUSES: [&str; 3] = ["deleted", "rejected", "failed"];

/// Result of one resolution attempt for a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResolution {
    /// One outcome per requested id, in batch order
    Resolved(Vec<LookupOutcome>),
    TransientFailure(String),
    PermanentFailure(String),
    /// Budget spent, locally or as reported by the service
    ///
    /// `charged` is true when the refusal came back from the service, so the
    /// request itself was spent.
    QuotaExhausted { reason: String, charged: bool },
    /// Admission was halted; no request was made
    Interrupted,
}

pub struct MetadataResolver {
    source: Arc<dyn VideoMetadataSource>,
    governor: Arc<RateGovernor>,
    token: ApiToken,
}

impl MetadataResolver {
    pub fn new(
        source: Arc<dyn VideoMetadataSource>,
        governor: Arc<RateGovernor>,
        token: ApiToken,
    ) -> Self {
        Self {
            source,
            governor,
            token,
        }
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    /// One governed lookup of `batch`
    ///
    /// Waiting for admission ends early when `halt` fires.
    pub async fn resolve(&self, batch: &Batch, halt: &CancellationToken) -> BatchResolution {
        match self.governor.acquire(halt).await {
            Ok(()) => {}
            Err(AdmissionError::Interrupted) => return BatchResolution::Interrupted,
            Err(e @ AdmissionError::QuotaExceeded { .. }) => {
                return BatchResolution::QuotaExhausted {
                    reason: e.to_string(),
                    charged: false,
                };
            }
        }

        match self.source.fetch_videos(&batch.video_ids, &self.token).await {
            Ok(records) => {
                tracing::debug!(
                    batch = batch.index,
                    requested = batch.len(),
                    returned = records.len(),
                    source = self.source.source_name(),
                    "Batch lookup returned"
                );
                BatchResolution::Resolved(classify_batch(&batch.video_ids, records))
            }
            Err(ServiceError::Transient(reason)) => BatchResolution::TransientFailure(reason),
            Err(ServiceError::Permanent(reason)) => BatchResolution::PermanentFailure(reason),
            Err(ServiceError::QuotaExceeded(reason)) => {
                self.governor.exhaust().await;
                BatchResolution::QuotaExhausted {
                    reason,
                    charged: true,
                }
            }
        }
    }
}

/// Classify every requested id against the returned records
///
/// The result has exactly one entry per position in `requested`, so a
/// repeated id yields one outcome per occurrence. Records for ids that were
/// not requested are ignored.
pub fn classify_batch(requested: &[VideoId], records: Vec<VideoRecord>) -> Vec<LookupOutcome> {
    let mut by_id: HashMap<String, VideoRecord> = HashMap::with_capacity(records.len());
    for record in records {
        by_id.entry(record.id.clone()).or_insert(record);
    }

    requested
        .iter()
        .map(|id| match by_id.get(id.as_str()) {
            Some(record) => classify_record(id, record),
            None => LookupOutcome::Deleted {
                video_id: id.clone(),
            },
        })
        .collect()
}

fn classify_record(id: &VideoId, record: &VideoRecord) -> LookupOutcome {
    if let Some(status) = record.upload_status.as_deref() {
        if UNAVAILABLE_UPLOAD_STATUSES.contains(&status) {
            return LookupOutcome::Deleted {
                video_id: id.clone(),
            };
        }
    }

    let Some(raw) = record.duration.as_deref() else {
        return LookupOutcome::skipped(id.clone(), SkipReason::MalformedDuration);
    };

    match parse_iso8601_duration(raw) {
        Ok(seconds) if seconds > MAX_PLAUSIBLE_DURATION_SECS => {
            tracing::debug!(video_id = %id, seconds, "Implausible duration");
            LookupOutcome::skipped(id.clone(), SkipReason::ImplausibleDuration)
        }
        Ok(seconds) => LookupOutcome::Resolved {
            video_id: id.clone(),
            duration_seconds: seconds,
        },
        Err(e) => {
            tracing::debug!(video_id = %id, error = %e, "Unparsable duration");
            LookupOutcome::skipped(id.clone(), SkipReason::MalformedDuration)
        }
    }
}
