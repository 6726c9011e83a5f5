//! Request admission for the metadata service
//!
//! One governor is created per run and shared by handle with every worker.
//! Admission is serialized by a single mutex that guards both the last
//! request time and the remaining budget, so concurrent workers can never
//! overspend the budget or issue requests closer than `min_interval`.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a request was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The run's request budget is spent
    #[error("request budget of {budget} exhausted")]
    QuotaExceeded { budget: u32 },

    /// The halt token fired while waiting for admission
    #[error("admission interrupted")]
    Interrupted,
}

/// Requests allowed by a quota of `quota_units` at `cost_per_request` each
pub fn request_budget(quota_units: u32, cost_per_request: u32) -> u32 {
    if cost_per_request == 0 {
        return u32::MAX;
    }
    quota_units / cost_per_request
}

#[derive(Debug)]
struct GovernorState {
    last_request: Option<Instant>,
    remaining: u32,
    admitted: u32,
}

/// Pacing plus budget enforcement
#[derive(Debug)]
pub struct RateGovernor {
    state: Mutex<GovernorState>,
    min_interval: Duration,
    budget: u32,
}

impl RateGovernor {
    pub fn new(min_interval: Duration, budget: u32) -> Self {
        Self {
            state: Mutex::new(GovernorState {
                last_request: None,
                remaining: budget,
                admitted: 0,
            }),
            min_interval,
            budget,
        }
    }

    /// Wait until a request may be issued and charge it to the budget
    ///
    /// Fails immediately once the budget is exhausted. The wait is at most
    /// `min_interval`. The lock is held across the wait so admissions are
    /// handed out one at a time. If `halt` fires while queued for the lock
    /// or during the pacing wait, nothing is charged.
    pub async fn acquire(&self, halt: &CancellationToken) -> Result<(), AdmissionError> {
        let mut state = tokio::select! {
            biased;
            _ = halt.cancelled() => return Err(AdmissionError::Interrupted),
            state = self.state.lock() => state,
        };

        if halt.is_cancelled() {
            return Err(AdmissionError::Interrupted);
        }
        if state.remaining == 0 {
            return Err(AdmissionError::QuotaExceeded {
                budget: self.budget,
            });
        }

        if let Some(last_time) = state.last_request {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::select! {
                    biased;
                    _ = halt.cancelled() => return Err(AdmissionError::Interrupted),
                    _ = tokio::time::sleep(wait_time) => {}
                }
            }
        }

        state.remaining -= 1;
        state.admitted += 1;
        state.last_request = Some(Instant::now());
        Ok(())
    }

    /// Drop the remaining budget to zero
    ///
    /// Used when the service itself reports the quota as spent.
    pub async fn exhaust(&self) {
        self.state.lock().await.remaining = 0;
    }

    /// Requests still available
    pub async fn remaining(&self) -> u32 {
        self.state.lock().await.remaining
    }

    /// Requests admitted so far
    pub async fn admitted(&self) -> u32 {
        self.state.lock().await.admitted
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }
}
