//! Running watch-time statistics and the outcome fold
//!
//! `fold` is the only mutation. Every branch only adds to counters, so the
//! final value is independent of the order outcomes arrive in.

use super::{LookupOutcome, SkipReason};
use serde::{Deserialize, Serialize};

/// Skipped entries split by cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipBreakdown {
    /// Transient failures exhausted the attempt cap
    pub unresolvable: u64,
    /// Request budget ran out
    pub quota_exhausted: u64,
    /// Missing, unparsable or implausible duration
    pub malformed: u64,
}

impl SkipBreakdown {
    pub fn total(&self) -> u64 {
        self.unresolvable + self.quota_exhausted + self.malformed
    }
}

/// Aggregate over all folded outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningStatistics {
    /// Capped watch time in seconds
    pub total_seconds: u64,
    pub total_count: u64,
    pub deleted_count: u64,
    pub skipped_count: u64,
    pub processed_count: u64,
    pub skipped_by_reason: SkipBreakdown,
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome, capping a resolved duration at `cap_seconds`
    #[must_use]
    pub fn fold(mut self, outcome: &LookupOutcome, cap_seconds: u64) -> Self {
        self.apply(outcome, cap_seconds);
        self
    }

    /// In-place form of [`fold`](Self::fold)
    pub fn apply(&mut self, outcome: &LookupOutcome, cap_seconds: u64) {
        match outcome {
            LookupOutcome::Resolved {
                duration_seconds, ..
            } => {
                self.total_seconds = self
                    .total_seconds
                    .saturating_add((*duration_seconds).min(cap_seconds));
                self.processed_count += 1;
            }
            LookupOutcome::Deleted { .. } => {
                self.deleted_count += 1;
            }
            LookupOutcome::Skipped { reason, .. } => {
                self.skipped_count += 1;
                match reason {
                    SkipReason::Unresolvable => self.skipped_by_reason.unresolvable += 1,
                    SkipReason::QuotaExhausted => self.skipped_by_reason.quota_exhausted += 1,
                    SkipReason::MalformedDuration | SkipReason::ImplausibleDuration => {
                        self.skipped_by_reason.malformed += 1
                    }
                }
            }
        }
        self.total_count += 1;
    }

    /// `total = deleted + skipped + processed`
    pub fn is_consistent(&self) -> bool {
        self.total_count == self.deleted_count + self.skipped_count + self.processed_count
            && self.skipped_by_reason.total() == self.skipped_count
    }
}
