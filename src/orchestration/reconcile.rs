use crate::domain::{CloseTrigger, Position, PositionKey, TimeMs};
use crate::engine::estimate_fill;
use crate::engine::outcome::{auto_trigger_exit_reason, ESTIMATED_ENTRY};
use crate::orchestration::deadline::Deadline;
use crate::orchestration::orchestrator::Inner;
use crate::orchestration::recorder::ClosedPosition;
use tracing::{debug, info, warn};

/// Trade history consulted when recovering an exchange-side close.
pub const TRADE_HISTORY_LIMIT: usize = 50;

impl Inner {
    /// Align the position book with the live position set.
    ///
    /// Newly observed positions get an open time (restored from the store or
    /// stamped now). Positions that vanished are recorded as auto-trigger
    /// closes. Positions we closed ourselves but the exchange still reports,
    /// and opens it does not report yet, are left alone inside the settle
    /// window. Returns the number of outcomes recorded.
    pub(crate) async fn reconcile(&self, live: &[Position], deadline: &Deadline) -> usize {
        let now = TimeMs::now();
        let changes = self
            .state
            .read()
            .await
            .book
            .diff(live, now, self.config.settle_window_ms());
        for key in &changes.stale {
            debug!(position = %key, "Closed position still reported, waiting for the exchange");
        }

        for key in &changes.newly_seen {
            if let Some(opened_at) = self.restore_open_time(key, now, deadline).await {
                self.state
                    .write()
                    .await
                    .book
                    .first_seen
                    .insert(key.clone(), opened_at);
            }
        }

        let mut recorded = 0;
        let mut unrecorded = Vec::new();
        for position in changes.disappeared.iter().cloned() {
            let key = position.key();
            let close_price = self.close_price(&position, deadline).await;
            let trades = match deadline
                .run(
                    "get account trades",
                    self.exchange
                        .get_account_trades(&position.symbol, TRADE_HISTORY_LIMIT),
                )
                .await
            {
                Ok(Ok(trades)) => trades,
                Ok(Err(e)) => {
                    warn!(position = %key, error = %e, "Trade history unavailable, estimating fill");
                    Vec::new()
                }
                Err(e) => {
                    warn!(position = %key, error = %e, "Trade history unavailable, estimating fill");
                    Vec::new()
                }
            };

            let fill = estimate_fill(&position, &trades, now, close_price);
            info!(
                position = %key,
                price = fill.price,
                quantity = fill.quantity,
                source = %fill.source,
                "Position closed on exchange"
            );
            let closed = ClosedPosition {
                position: position.clone(),
                close_price: fill.price,
                quantity: fill.quantity,
                realized_pnl: fill.realized_pnl,
                closed_at: now,
                trigger: CloseTrigger::AutoTrigger,
                fill_source: fill.source,
                exit_reason: auto_trigger_exit_reason(fill.source).to_string(),
            };
            match self.record_close(closed, deadline).await {
                Ok(Some(_)) => recorded += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(position = %key, error = %e, "Failed to record auto-close, will retry");
                    unrecorded.push(position);
                }
            }
        }

        self.state
            .write()
            .await
            .book
            .apply(live, &changes, unrecorded);
        recorded
    }

    async fn restore_open_time(
        &self,
        key: &PositionKey,
        now: TimeMs,
        deadline: &Deadline,
    ) -> Option<TimeMs> {
        match deadline
            .run("get open time", self.repo.get_position_open_time(key))
            .await
        {
            Ok(Ok(Some(record))) => {
                debug!(position = %key, opened_at = %record.opened_at, "Restored open time");
                Some(record.opened_at)
            }
            Ok(Ok(None)) => {
                info!(position = %key, "Untracked position, open time estimated as now");
                let saved = deadline
                    .run(
                        "save open time",
                        self.repo.save_position_open_time(key, now, ESTIMATED_ENTRY),
                    )
                    .await;
                if !matches!(saved, Ok(Ok(()))) {
                    warn!(position = %key, "Failed to persist estimated open time");
                }
                Some(now)
            }
            Ok(Err(e)) => {
                warn!(position = %key, error = %e, "Open time lookup failed");
                None
            }
            Err(e) => {
                warn!(position = %key, error = %e, "Open time lookup failed");
                None
            }
        }
    }
}
