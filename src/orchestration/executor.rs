//! Sequential decision execution.

use crate::domain::{
    CloseTrigger, Decision, ExecutionOutcome, FillSource, Position, PositionKey, PositionSide,
    TimeMs,
};
use crate::exchange::ExchangeError;
use crate::orchestration::deadline::{Deadline, DeadlineElapsed};
use crate::orchestration::orchestrator::Inner;
use crate::orchestration::recorder::ClosedPosition;
use thiserror::Error;
use tracing::{info, warn};

/// Why a single decision was not executed. Never aborts the cycle.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("duplicate position: {0} is already open")]
    DuplicatePosition(PositionKey),
    #[error("max positions reached ({0})")]
    MaxPositions(usize),
    #[error("no open position for {0}")]
    NoPosition(PositionKey),
    #[error("invalid position size {0}")]
    InvalidSize(f64),
    #[error("invalid market price {0}")]
    InvalidPrice(f64),
    #[error("trader paused")]
    Paused,
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Deadline(#[from] DeadlineElapsed),
}

/// Leverage actually sent: at least 1, at most the asset-class cap.
pub fn clamp_leverage(requested: u32, cap: u32) -> u32 {
    requested.max(1).min(cap.max(1))
}

/// Pre-trade checks for an open, run before any exchange call.
pub fn check_open(
    key: &PositionKey,
    live: &[PositionKey],
    max_positions: usize,
    size_usd: f64,
) -> Result<(), ExecutionError> {
    if live.contains(key) {
        return Err(ExecutionError::DuplicatePosition(key.clone()));
    }
    if live.len() >= max_positions {
        return Err(ExecutionError::MaxPositions(max_positions));
    }
    if !size_usd.is_finite() || size_usd <= 0.0 {
        return Err(ExecutionError::InvalidSize(size_usd));
    }
    Ok(())
}

struct Filled {
    order_id: String,
    quantity: f64,
    price: f64,
    leverage: u32,
}

impl Inner {
    /// Execute `decisions` in the given order. Hold and wait produce no entry.
    pub(crate) async fn execute_decisions(
        &self,
        decisions: &[Decision],
        deadline: &Deadline,
    ) -> Vec<ExecutionOutcome> {
        let mut executions = Vec::new();

        for decision in decisions {
            let side = match decision.action.side() {
                Some(side) => side,
                None => continue,
            };
            let mut execution = ExecutionOutcome::pending(decision);

            if self.state.read().await.is_paused {
                warn!(symbol = %decision.symbol, action = %decision.action, "Trader paused mid-cycle, skipping decision");
                execution.error = Some(ExecutionError::Paused.to_string());
                executions.push(execution);
                continue;
            }

            let result = if decision.action.is_open() {
                self.execute_open(decision, side, deadline).await
            } else {
                self.execute_close(decision, side, deadline).await
            };

            match result {
                Ok(filled) => {
                    info!(
                        symbol = %decision.symbol,
                        action = %decision.action,
                        quantity = filled.quantity,
                        price = filled.price,
                        order_id = %filled.order_id,
                        "Decision executed"
                    );
                    execution.success = true;
                    execution.quantity = filled.quantity;
                    execution.price = filled.price;
                    execution.leverage = filled.leverage;
                    execution.order_id = Some(filled.order_id);
                    execution.timestamp = TimeMs::now();
                    executions.push(execution);

                    let spacing = self.config.order_spacing();
                    if !spacing.is_zero() {
                        tokio::time::sleep(spacing).await;
                    }
                }
                Err(e) => {
                    warn!(symbol = %decision.symbol, action = %decision.action, error = %e, "Decision failed");
                    execution.error = Some(e.to_string());
                    execution.timestamp = TimeMs::now();
                    executions.push(execution);
                }
            }
        }

        executions
    }

    async fn execute_open(
        &self,
        decision: &Decision,
        side: PositionSide,
        deadline: &Deadline,
    ) -> Result<Filled, ExecutionError> {
        let symbol = decision.symbol.as_str();
        let key = PositionKey::new(symbol, side);
        let live = self.state.read().await.book.open_keys();
        check_open(
            &key,
            &live,
            self.config.max_positions,
            decision.position_size_usd,
        )?;

        let cap = self.config.leverage_cap(symbol);
        let leverage = clamp_leverage(decision.leverage, cap);
        if leverage != decision.leverage {
            info!(%symbol, requested = decision.leverage, leverage, "Leverage clamped");
        }

        let price = deadline
            .run("get market price", self.exchange.get_market_price(symbol))
            .await??;
        if !price.is_finite() || price <= 0.0 {
            return Err(ExecutionError::InvalidPrice(price));
        }
        let quantity = decision.position_size_usd / price;

        let order = match side {
            PositionSide::Long => self.exchange.open_long(symbol, quantity, leverage),
            PositionSide::Short => self.exchange.open_short(symbol, quantity, leverage),
        };
        let ack = deadline.run("open order", order).await??;

        let opened_at = TimeMs::now();
        let reason = if decision.reasoning.is_empty() {
            decision.action.as_str()
        } else {
            decision.reasoning.as_str()
        };
        match deadline
            .run(
                "save open time",
                self.repo.save_position_open_time(&key, opened_at, reason),
            )
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(position = %key, error = %e, "Failed to persist open time"),
            Err(e) => warn!(position = %key, error = %e, "Failed to persist open time"),
        }

        // pending until a positions read reports it
        self.state.write().await.book.open(
            Position {
                symbol: symbol.to_string(),
                side,
                entry_price: price,
                mark_price: price,
                quantity,
                leverage,
                liquidation_price: 0.0,
                unrealized_pnl: 0.0,
                margin_used: 0.0,
                opened_at: None,
            },
            opened_at,
        );

        if decision.stop_loss > 0.0 {
            let result = deadline
                .run(
                    "set stop loss",
                    self.exchange
                        .set_stop_loss(symbol, side, quantity, decision.stop_loss),
                )
                .await;
            if !matches!(result, Ok(Ok(()))) {
                warn!(position = %key, price = decision.stop_loss, "Failed to place stop loss");
            }
        }
        if decision.take_profit > 0.0 {
            let result = deadline
                .run(
                    "set take profit",
                    self.exchange
                        .set_take_profit(symbol, side, quantity, decision.take_profit),
                )
                .await;
            if !matches!(result, Ok(Ok(()))) {
                warn!(position = %key, price = decision.take_profit, "Failed to place take profit");
            }
        }

        Ok(Filled {
            order_id: ack.order_id,
            quantity,
            price,
            leverage,
        })
    }

    async fn execute_close(
        &self,
        decision: &Decision,
        side: PositionSide,
        deadline: &Deadline,
    ) -> Result<Filled, ExecutionError> {
        let symbol = decision.symbol.as_str();
        let key = PositionKey::new(symbol, side);
        let position = self
            .state
            .read()
            .await
            .book
            .get(&key)
            .cloned()
            .ok_or_else(|| ExecutionError::NoPosition(key.clone()))?;

        let price = self.close_price(&position, deadline).await;
        let quantity = position.quantity;
        let leverage = position.leverage;
        let order = match side {
            PositionSide::Long => self.exchange.close_long(symbol, quantity),
            PositionSide::Short => self.exchange.close_short(symbol, quantity),
        };
        let ack = deadline.run("close order", order).await??;

        let exit_reason = if decision.reasoning.is_empty() {
            decision.action.as_str().to_string()
        } else {
            decision.reasoning.clone()
        };
        let closed = ClosedPosition {
            position,
            close_price: price,
            quantity,
            realized_pnl: None,
            closed_at: TimeMs::now(),
            trigger: CloseTrigger::Decision,
            fill_source: FillSource::Order,
            exit_reason,
        };
        if let Err(e) = self.record_close(closed, deadline).await {
            warn!(position = %key, error = %e, "Close filled but outcome not recorded, reconciliation will retry");
        }

        Ok(Filled {
            order_id: ack.order_id,
            quantity,
            price,
            leverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Action;

    fn key(symbol: &str, side: PositionSide) -> PositionKey {
        PositionKey::new(symbol, side)
    }

    #[test]
    fn test_clamp_leverage() {
        assert_eq!(clamp_leverage(0, 5), 1);
        assert_eq!(clamp_leverage(3, 5), 3);
        assert_eq!(clamp_leverage(20, 5), 5);
        assert_eq!(clamp_leverage(20, 0), 1);
    }

    #[test]
    fn test_duplicate_rejected_before_limits() {
        let open = key("BTCUSDT", PositionSide::Long);
        let err = check_open(&open, &[open.clone()], 1, 100.0).unwrap_err();
        assert!(matches!(err, ExecutionError::DuplicatePosition(_)));
        assert!(err.to_string().starts_with("duplicate position"));
    }

    #[test]
    fn test_opposite_side_is_not_a_duplicate() {
        let live = [key("BTCUSDT", PositionSide::Long)];
        assert!(check_open(&key("BTCUSDT", PositionSide::Short), &live, 3, 100.0).is_ok());
    }

    #[test]
    fn test_max_positions_and_size() {
        let live = [key("BTCUSDT", PositionSide::Long), key("ETHUSDT", PositionSide::Long)];
        let sol = key("SOLUSDT", PositionSide::Long);
        assert!(matches!(
            check_open(&sol, &live, 2, 100.0),
            Err(ExecutionError::MaxPositions(2))
        ));
        assert!(matches!(
            check_open(&sol, &live, 3, 0.0),
            Err(ExecutionError::InvalidSize(_))
        ));
        assert!(matches!(
            check_open(&sol, &live, 3, f64::NAN),
            Err(ExecutionError::InvalidSize(_))
        ));
    }

    #[test]
    fn test_hold_and_wait_have_no_side() {
        assert!(Action::Hold.side().is_none());
        assert!(Action::Wait.side().is_none());
    }
}
