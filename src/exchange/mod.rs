//! Exchange abstraction: account reads, market data and order placement.

use crate::domain::{AccountTrade, Balance, Kline, OrderAck, Position, PositionSide};
use async_trait::async_trait;
use std::fmt;

pub mod gateway;
pub mod mock;

pub use gateway::GatewayExchange;
pub use mock::{ExchangeCall, MockExchange};

/// Derivatives venue capability, implemented per venue and injected.
///
/// Implementations own signing, transport and retry of idempotent reads.
/// Order methods must not be retried blindly: a timed-out order may have filled.
#[async_trait]
pub trait Exchange: Send + Sync + fmt::Debug {
    async fn get_balance(&self) -> Result<Balance, ExchangeError>;

    /// Live positions; zero-quantity entries are filtered out.
    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError>;

    async fn open_long(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<OrderAck, ExchangeError>;

    async fn open_short(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<OrderAck, ExchangeError>;

    async fn close_long(&self, symbol: &str, quantity: f64) -> Result<OrderAck, ExchangeError>;

    async fn close_short(&self, symbol: &str, quantity: f64) -> Result<OrderAck, ExchangeError>;

    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError>;

    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError>;

    /// Latest traded (mark) price.
    async fn get_market_price(&self, symbol: &str) -> Result<f64, ExchangeError>;

    /// OHLCV bars, oldest first.
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ExchangeError>;

    /// Most recent account trades for `symbol`.
    async fn get_account_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AccountTrade>, ExchangeError>;
}

/// Error type for exchange operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// Venue-side validation rejected the request
    Rejected(String),
    /// Other error
    Other(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ExchangeError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            ExchangeError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ExchangeError::RateLimited => write!(f, "Rate limited"),
            ExchangeError::Rejected(msg) => write!(f, "Order rejected: {}", msg),
            ExchangeError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for ExchangeError {}
