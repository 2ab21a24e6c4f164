use crate::db::{Repository, StoreError};
use crate::engine::performance::reconstruct_outcomes;
use crate::engine::{analyze, PerformanceSummary};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    repo: Arc<Repository>,
    lookback_cycles: usize,
    premature_exit_minutes: i64,
}

impl PerformanceAnalyzer {
    pub fn new(repo: Arc<Repository>, lookback_cycles: usize, premature_exit_minutes: i64) -> Self {
        Self {
            repo,
            lookback_cycles,
            premature_exit_minutes,
        }
    }

    /// Summarize outcomes closed within the last `lookback_cycles` cycles
    /// against the equity curve of the same cycles.
    ///
    /// With an empty outcome table, trades are rebuilt from the cycle log and
    /// persisted, so the fallback only runs until the first pass succeeds.
    pub async fn summarize(&self) -> Result<PerformanceSummary, StoreError> {
        let since = self
            .repo
            .get_cycle_window_start(self.lookback_cycles)
            .await?
            .unwrap_or_default();
        let mut outcomes = self.repo.get_trade_outcomes_since(since).await?;

        if outcomes.is_empty() && self.repo.count_trade_outcomes().await? == 0 {
            let records = self
                .repo
                .get_recent_cycle_records(self.lookback_cycles)
                .await?;
            let rebuilt = reconstruct_outcomes(&records, self.premature_exit_minutes);
            if !rebuilt.is_empty() {
                let mut inserted = 0;
                for outcome in &rebuilt {
                    if self.repo.save_trade_outcome(outcome).await? {
                        inserted += 1;
                    }
                }
                tracing::info!(
                    rebuilt = rebuilt.len(),
                    inserted,
                    "Reconstructed trade outcomes from the decision log"
                );
                outcomes = self.repo.get_trade_outcomes_since(since).await?;
            }
        }

        let equity = self.repo.get_recent_equity(self.lookback_cycles).await?;
        Ok(analyze(&outcomes, &equity))
    }
}
