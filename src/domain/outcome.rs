//! Trade outcomes: one row per closed position lifecycle.

use super::{PositionSide, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What caused a position to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTrigger {
    /// A close decision executed by the cycle.
    Decision,
    /// An operator-requested close.
    Manual,
    /// Position vanished from the exchange (stop-loss / take-profit fill).
    AutoTrigger,
}

/// Where the close price and quantity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSource {
    /// Market price observed when the core placed the close order.
    Order,
    /// Matched against the exchange's trade history.
    TradeHistory,
    /// Quantity reverse-engineered from a realized P&L figure.
    RealizedPnl,
    /// Last known position snapshot valued at the current price.
    Snapshot,
}

impl FillSource {
    /// True when the fill economics are an estimate rather than observed data.
    pub fn is_estimated(&self) -> bool {
        matches!(self, FillSource::RealizedPnl | FillSource::Snapshot)
    }
}

/// Classification of a losing trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    StopLoss,
    PrematureExit,
    AdverseMove,
}

macro_rules! impl_str_enum {
    ($ty:ty { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($ty), other)),
                }
            }
        }
    };
}

impl_str_enum!(CloseTrigger {
    Decision => "decision",
    Manual => "manual",
    AutoTrigger => "auto_trigger",
});

impl_str_enum!(FillSource {
    Order => "order",
    TradeHistory => "trade_history",
    RealizedPnl => "realized_pnl",
    Snapshot => "snapshot",
});

impl_str_enum!(FailureType {
    StopLoss => "stop_loss",
    PrematureExit => "premature_exit",
    AdverseMove => "adverse_move",
});

/// Input to the close funnel: everything known about a close event.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseEvent {
    pub symbol: String,
    pub side: PositionSide,
    pub leverage: u32,
    pub entry_price: f64,
    pub close_price: f64,
    pub quantity: f64,
    /// Exchange-reported realized P&L, when known.
    pub realized_pnl: Option<f64>,
    pub opened_at: TimeMs,
    pub closed_at: TimeMs,
    pub trigger: CloseTrigger,
    pub fill_source: FillSource,
    pub entry_reason: String,
    pub exit_reason: String,
}

/// Persisted result of one closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOutcome {
    /// Lifecycle identity; the store keeps at most one row per key.
    pub outcome_key: String,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub leverage: u32,
    pub open_price: f64,
    pub close_price: f64,
    pub position_value: f64,
    pub margin_used: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub duration_minutes: i64,
    pub open_time: TimeMs,
    pub close_time: TimeMs,
    pub was_stop_loss: bool,
    pub entry_reason: String,
    pub exit_reason: String,
    pub is_premature: bool,
    pub failure_type: Option<FailureType>,
    pub close_trigger: CloseTrigger,
    pub fill_source: FillSource,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    /// Compute the lifecycle key for a position opened at `open_time`.
    pub fn compute_outcome_key(symbol: &str, side: PositionSide, open_time: TimeMs) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(side.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(open_time.as_i64().to_le_bytes());
        hex::encode(hasher.finalize())
    }
}
