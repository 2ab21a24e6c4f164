//! The single close funnel. Decision closes, manual closes and reconciled
//! auto-closes all end up in [`OutcomeRecorder::record_close`].

use crate::db::{Repository, StoreError};
use crate::domain::{CloseEvent, CloseTrigger, FillSource, Position, TimeMs, TradeOutcome};
use crate::engine::build_outcome;
use crate::engine::outcome::ESTIMATED_ENTRY;
use std::sync::Arc;
use tracing::{debug, info};

/// A position that just closed, with whatever is known about the fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    /// Last snapshot of the position before it closed.
    pub position: Position,
    pub close_price: f64,
    pub quantity: f64,
    pub realized_pnl: Option<f64>,
    pub closed_at: TimeMs,
    pub trigger: CloseTrigger,
    pub fill_source: FillSource,
    pub exit_reason: String,
}

#[derive(Debug, Clone)]
pub struct OutcomeRecorder {
    repo: Arc<Repository>,
    premature_exit_minutes: i64,
}

impl OutcomeRecorder {
    pub fn new(repo: Arc<Repository>, premature_exit_minutes: i64) -> Self {
        Self {
            repo,
            premature_exit_minutes,
        }
    }

    /// Persist the outcome for `closed` and drop its open-time entry.
    ///
    /// The open time comes from the store, then `fallback_opened_at`, then the
    /// close time itself. Returns `None` when this lifecycle was already
    /// recorded by another trigger.
    pub async fn record_close(
        &self,
        closed: &ClosedPosition,
        fallback_opened_at: Option<TimeMs>,
    ) -> Result<Option<TradeOutcome>, StoreError> {
        let key = closed.position.key();
        let open_record = self.repo.get_position_open_time(&key).await?;
        let (opened_at, entry_reason) = match open_record {
            Some(record) => (record.opened_at, record.entry_reason),
            None => (
                fallback_opened_at.unwrap_or(closed.closed_at),
                ESTIMATED_ENTRY.to_string(),
            ),
        };

        let event = CloseEvent {
            symbol: closed.position.symbol.clone(),
            side: closed.position.side,
            leverage: closed.position.leverage,
            entry_price: closed.position.entry_price,
            close_price: closed.close_price,
            quantity: closed.quantity,
            realized_pnl: closed.realized_pnl,
            opened_at,
            closed_at: closed.closed_at,
            trigger: closed.trigger,
            fill_source: closed.fill_source,
            entry_reason,
            exit_reason: closed.exit_reason.clone(),
        };
        let outcome = build_outcome(&event, self.premature_exit_minutes);

        let inserted = self.repo.save_trade_outcome(&outcome).await?;
        self.repo.delete_position_open_time(&key).await?;

        if !inserted {
            debug!(position = %key, "Outcome already recorded, skipping");
            return Ok(None);
        }
        info!(
            position = %key,
            trigger = %closed.trigger,
            fill_source = %closed.fill_source,
            pnl = outcome.pnl,
            "Recorded trade outcome"
        );
        Ok(Some(outcome))
    }
}
