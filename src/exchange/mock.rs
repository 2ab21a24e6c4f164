//! In-memory exchange for tests. Records every call and simulates fills.

use super::{Exchange, ExchangeError};
use crate::domain::{AccountTrade, Balance, Kline, OrderAck, Position, PositionSide};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeCall {
    GetBalance,
    GetPositions,
    OpenLong {
        symbol: String,
        quantity: f64,
        leverage: u32,
    },
    OpenShort {
        symbol: String,
        quantity: f64,
        leverage: u32,
    },
    CloseLong {
        symbol: String,
        quantity: f64,
    },
    CloseShort {
        symbol: String,
        quantity: f64,
    },
    SetStopLoss {
        symbol: String,
        side: PositionSide,
        price: f64,
    },
    SetTakeProfit {
        symbol: String,
        side: PositionSide,
        price: f64,
    },
    GetMarketPrice(String),
    GetKlines(String),
    GetAccountTrades(String),
}

impl ExchangeCall {
    /// True for calls that place or modify orders.
    pub fn is_order(&self) -> bool {
        matches!(
            self,
            ExchangeCall::OpenLong { .. }
                | ExchangeCall::OpenShort { .. }
                | ExchangeCall::CloseLong { .. }
                | ExchangeCall::CloseShort { .. }
                | ExchangeCall::SetStopLoss { .. }
                | ExchangeCall::SetTakeProfit { .. }
        )
    }
}

#[derive(Debug, Default)]
struct MockState {
    balance: Balance,
    positions: Vec<Position>,
    prices: HashMap<String, f64>,
    klines: HashMap<String, Vec<Kline>>,
    trades: HashMap<String, Vec<AccountTrade>>,
    failing_symbols: HashSet<String>,
    fail_reads: bool,
    read_delay: Option<Duration>,
    calls: Vec<ExchangeCall>,
    next_order_id: u64,
}

/// Mock exchange with shared state, so a clone handed to the orchestrator
/// stays observable from the test.
#[derive(Debug, Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_balance(self, balance: Balance) -> Self {
        self.lock().balance = balance;
        self
    }

    pub fn with_position(self, position: Position) -> Self {
        self.lock().positions.push(position);
        self
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.lock().prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_klines(self, symbol: &str, klines: Vec<Kline>) -> Self {
        self.lock().klines.insert(symbol.to_string(), klines);
        self
    }

    pub fn with_trades(self, symbol: &str, trades: Vec<AccountTrade>) -> Self {
        self.lock().trades.insert(symbol.to_string(), trades);
        self
    }

    /// Reject every order for `symbol`.
    pub fn with_failing_orders(self, symbol: &str) -> Self {
        self.lock().failing_symbols.insert(symbol.to_string());
        self
    }

    /// Delay every balance and position read.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.lock().read_delay = Some(delay);
        self
    }

    /// Replace the live position set, e.g. to simulate an exchange-side close.
    pub fn set_positions(&self, positions: Vec<Position>) {
        self.lock().positions = positions;
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.lock().prices.insert(symbol.to_string(), price);
    }

    pub fn set_trades(&self, symbol: &str, trades: Vec<AccountTrade>) {
        self.lock().trades.insert(symbol.to_string(), trades);
    }

    /// Make balance and position reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn positions(&self) -> Vec<Position> {
        self.lock().positions.clone()
    }

    pub fn calls(&self) -> Vec<ExchangeCall> {
        self.lock().calls.clone()
    }

    pub fn order_calls(&self) -> Vec<ExchangeCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_order())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, call: ExchangeCall) {
        self.lock().calls.push(call);
    }

    async fn read_gate(&self) -> Result<(), ExchangeError> {
        let (delay, fail) = {
            let state = self.lock();
            (state.read_delay, state.fail_reads)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ExchangeError::NetworkError("mock read failure".to_string()));
        }
        Ok(())
    }

    fn open(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        leverage: u32,
    ) -> Result<OrderAck, ExchangeError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.failing_symbols.contains(symbol) {
            return Err(ExchangeError::Rejected(format!("{} orders disabled", symbol)));
        }
        let price = state.prices.get(symbol).copied().unwrap_or(0.0);
        match state
            .positions
            .iter_mut()
            .find(|p| p.symbol == symbol && p.side == side)
        {
            Some(existing) => {
                let total = existing.quantity + quantity;
                existing.entry_price =
                    (existing.entry_price * existing.quantity + price * quantity) / total;
                existing.quantity = total;
            }
            None => state.positions.push(Position {
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
            }),
        }
        state.next_order_id += 1;
        Ok(OrderAck {
            order_id: format!("mock-{}", state.next_order_id),
        })
    }

    fn close(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        let mut state = self.lock();
        if state.failing_symbols.contains(symbol) {
            return Err(ExchangeError::Rejected(format!("{} orders disabled", symbol)));
        }
        let idx = state
            .positions
            .iter()
            .position(|p| p.symbol == symbol && p.side == side)
            .ok_or_else(|| ExchangeError::Rejected(format!("no {} {} position", symbol, side)))?;
        let remaining = state.positions[idx].quantity - quantity;
        if quantity <= 0.0 || remaining <= 0.0 {
            state.positions.remove(idx);
        } else {
            state.positions[idx].quantity = remaining;
        }
        state.next_order_id += 1;
        Ok(OrderAck {
            order_id: format!("mock-{}", state.next_order_id),
        })
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_balance(&self) -> Result<Balance, ExchangeError> {
        self.record(ExchangeCall::GetBalance);
        self.read_gate().await?;
        Ok(self.lock().balance)
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        self.record(ExchangeCall::GetPositions);
        self.read_gate().await?;
        let state = self.lock();
        Ok(state
            .positions
            .iter()
            .filter(|p| p.quantity > 0.0)
            .map(|p| {
                let mut p = p.clone();
                if let Some(price) = state.prices.get(&p.symbol) {
                    p.mark_price = *price;
                }
                p
            })
            .collect())
    }

    async fn open_long(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<OrderAck, ExchangeError> {
        self.record(ExchangeCall::OpenLong {
            symbol: symbol.to_string(),
            quantity,
            leverage,
        });
        self.open(symbol, PositionSide::Long, quantity, leverage)
    }

    async fn open_short(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<OrderAck, ExchangeError> {
        self.record(ExchangeCall::OpenShort {
            symbol: symbol.to_string(),
            quantity,
            leverage,
        });
        self.open(symbol, PositionSide::Short, quantity, leverage)
    }

    async fn close_long(&self, symbol: &str, quantity: f64) -> Result<OrderAck, ExchangeError> {
        self.record(ExchangeCall::CloseLong {
            symbol: symbol.to_string(),
            quantity,
        });
        self.close(symbol, PositionSide::Long, quantity)
    }

    async fn close_short(&self, symbol: &str, quantity: f64) -> Result<OrderAck, ExchangeError> {
        self.record(ExchangeCall::CloseShort {
            symbol: symbol.to_string(),
            quantity,
        });
        self.close(symbol, PositionSide::Short, quantity)
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        _quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError> {
        self.record(ExchangeCall::SetStopLoss {
            symbol: symbol.to_string(),
            side,
            price,
        });
        Ok(())
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        _quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError> {
        self.record(ExchangeCall::SetTakeProfit {
            symbol: symbol.to_string(),
            side,
            price,
        });
        Ok(())
    }

    async fn get_market_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.record(ExchangeCall::GetMarketPrice(symbol.to_string()));
        self.lock()
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::Other(format!("no price for {}", symbol)))
    }

    async fn get_klines(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ExchangeError> {
        self.record(ExchangeCall::GetKlines(symbol.to_string()));
        let state = self.lock();
        let klines = state.klines.get(symbol).cloned().unwrap_or_default();
        let skip = klines.len().saturating_sub(limit);
        Ok(klines.into_iter().skip(skip).collect())
    }

    async fn get_account_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AccountTrade>, ExchangeError> {
        self.record(ExchangeCall::GetAccountTrades(symbol.to_string()));
        let state = self.lock();
        let mut trades = state.trades.get(symbol).cloned().unwrap_or_default();
        trades.sort_by_key(|t| std::cmp::Reverse(t.time));
        trades.truncate(limit);
        Ok(trades)
    }
}

/// Build a live position for tests.
pub fn test_position(symbol: &str, side: PositionSide, entry: f64, quantity: f64) -> Position {
    Position {
        symbol: symbol.to_string(),
        side,
        entry_price: entry,
        mark_price: entry,
        quantity,
        leverage: 5,
        liquidation_price: 0.0,
        unrealized_pnl: 0.0,
        margin_used: 0.0,
        opened_at: None,
    }
}

/// Flat-ish synthetic bars ending at `close`, one per 3 minutes.
pub fn test_klines(close: f64, count: usize) -> Vec<Kline> {
    (0..count)
        .map(|i| {
            let c = close * (1.0 + 0.001 * (i as f64 - count as f64 + 1.0));
            Kline::new(
                i as i64 * 180_000,
                c * 0.999,
                c * 1.002,
                c * 0.997,
                c,
                1_000.0 + i as f64,
            )
        })
        .collect()
}
