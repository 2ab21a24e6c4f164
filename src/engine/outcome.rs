//! Close economics: turns a [`CloseEvent`] into a [`TradeOutcome`].

use crate::domain::{CloseEvent, CloseTrigger, FailureType, FillSource, PositionSide, TradeOutcome};

pub const AUTO_TRIGGER_EXIT: &str = "stop/take-profit auto-trigger";
pub const AUTO_TRIGGER_EXIT_ESTIMATED: &str = "stop/take-profit auto-trigger (estimated fill)";
pub const MANUAL_EXIT: &str = "manual close";
pub const ESTIMATED_ENTRY: &str = "observed on exchange (open time estimated)";

/// Directional P&L for `quantity` moved from `open_price` to `close_price`.
pub fn price_pnl(side: PositionSide, open_price: f64, close_price: f64, quantity: f64) -> f64 {
    match side {
        PositionSide::Long => (close_price - open_price) * quantity,
        PositionSide::Short => (open_price - close_price) * quantity,
    }
}

/// Exit reason for an auto-trigger close, marking estimated fills.
pub fn auto_trigger_exit_reason(source: FillSource) -> &'static str {
    if source.is_estimated() {
        AUTO_TRIGGER_EXIT_ESTIMATED
    } else {
        AUTO_TRIGGER_EXIT
    }
}

/// Build the outcome row for a close.
///
/// Exchange-reported realized P&L wins over the price formula.
pub fn build_outcome(event: &CloseEvent, premature_minutes: i64) -> TradeOutcome {
    let leverage = event.leverage.max(1);
    let position_value = event.quantity * event.entry_price;
    let margin_used = position_value / leverage as f64;
    let pnl = event.realized_pnl.unwrap_or_else(|| {
        price_pnl(
            event.side,
            event.entry_price,
            event.close_price,
            event.quantity,
        )
    });
    let pnl_pct = if margin_used > 0.0 {
        pnl / margin_used * 100.0
    } else {
        0.0
    };
    let duration_minutes = event.closed_at.minutes_since(event.opened_at).max(0);
    let is_premature = duration_minutes < premature_minutes;
    let was_stop_loss = event.trigger == CloseTrigger::AutoTrigger;

    let failure_type = if pnl >= 0.0 {
        None
    } else if was_stop_loss {
        Some(FailureType::StopLoss)
    } else if is_premature {
        Some(FailureType::PrematureExit)
    } else {
        Some(FailureType::AdverseMove)
    };

    TradeOutcome {
        outcome_key: TradeOutcome::compute_outcome_key(&event.symbol, event.side, event.opened_at),
        symbol: event.symbol.clone(),
        side: event.side,
        quantity: event.quantity,
        leverage,
        open_price: event.entry_price,
        close_price: event.close_price,
        position_value,
        margin_used,
        pnl,
        pnl_pct,
        duration_minutes,
        open_time: event.opened_at,
        close_time: event.closed_at,
        was_stop_loss,
        entry_reason: event.entry_reason.clone(),
        exit_reason: event.exit_reason.clone(),
        is_premature,
        failure_type,
        close_trigger: event.trigger,
        fill_source: event.fill_source,
    }
}
