//! Per-cycle time budget with per-call caps.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} exceeded its deadline of {budget_ms} ms")]
pub struct DeadlineElapsed {
    pub operation: String,
    pub budget_ms: u128,
}

/// Every external call made during a cycle runs under
/// `min(call_timeout, remaining cycle budget)`.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
    call_timeout: Duration,
}

impl Deadline {
    pub fn new(cycle_budget: Duration, call_timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now() + cycle_budget,
            call_timeout,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn call_budget(&self) -> Duration {
        self.call_timeout.min(self.remaining())
    }

    pub async fn run<F>(&self, operation: &str, future: F) -> Result<F::Output, DeadlineElapsed>
    where
        F: Future,
    {
        let budget = self.call_budget();
        tokio::time::timeout(budget, future)
            .await
            .map_err(|_| DeadlineElapsed {
                operation: operation.to_string(),
                budget_ms: budget.as_millis(),
            })
    }
}
