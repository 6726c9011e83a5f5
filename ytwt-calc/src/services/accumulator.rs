//! Shared statistics accumulator
//!
//! Workers finish batches in any order and fold their outcomes here. A batch
//! is folded under one lock, so a snapshot never shows half a batch.

use crate::models::{LookupOutcome, RunningStatistics};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct Accumulator {
    stats: Mutex<RunningStatistics>,
    cap_seconds: u64,
}

impl Accumulator {
    pub fn new(cap_seconds: u64) -> Self {
        Self {
            stats: Mutex::new(RunningStatistics::new()),
            cap_seconds,
        }
    }

    pub fn cap_seconds(&self) -> u64 {
        self.cap_seconds
    }

    /// Fold a whole batch of outcomes and return the updated totals
    pub fn fold_all<'a, I>(&self, outcomes: I) -> RunningStatistics
    where
        I: IntoIterator<Item = &'a LookupOutcome>,
    {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        for outcome in outcomes {
            stats.apply(outcome, self.cap_seconds);
        }
        *stats
    }

    pub fn snapshot(&self) -> RunningStatistics {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
