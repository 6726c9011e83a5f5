//! Per-video lookup outcome classification

use super::VideoId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a video was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Duration missing or not a valid ISO-8601 duration
    #[serde(rename = "malformed duration")]
    MalformedDuration,
    /// Duration parsed but above the sanity bound
    #[serde(rename = "implausible duration")]
    ImplausibleDuration,
    /// Batch kept failing transiently until the attempt cap
    #[serde(rename = "unresolvable")]
    Unresolvable,
    /// Request budget ran out before the batch was looked up
    #[serde(rename = "quota exhausted")]
    QuotaExhausted,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::MalformedDuration => "malformed duration",
            SkipReason::ImplausibleDuration => "implausible duration",
            SkipReason::Unresolvable => "unresolvable",
            SkipReason::QuotaExhausted => "quota exhausted",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of looking up one requested video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum LookupOutcome {
    /// Duration known, in raw (uncapped) seconds
    Resolved {
        video_id: VideoId,
        duration_seconds: u64,
    },
    /// Absent from the response or reported unavailable
    Deleted { video_id: VideoId },
    /// Could not be counted
    Skipped { video_id: VideoId, reason: SkipReason },
}

impl LookupOutcome {
    pub fn video_id(&self) -> &VideoId {
        match self {
            LookupOutcome::Resolved { video_id, .. }
            | LookupOutcome::Deleted { video_id }
            | LookupOutcome::Skipped { video_id, .. } => video_id,
        }
    }

    pub fn skipped(video_id: VideoId, reason: SkipReason) -> Self {
        LookupOutcome::Skipped { video_id, reason }
    }
}
