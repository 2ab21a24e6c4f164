//! Live derivatives position.

use super::{PositionKey, PositionSide, TimeMs};
use serde::{Deserialize, Serialize};

/// A live position as reported by the exchange.
///
/// `opened_at` is not an exchange field: the orchestrator fills it from its
/// first-seen tracking so downstream consumers see a holding duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub mark_price: f64,
    /// Always positive; direction lives in `side`.
    pub quantity: f64,
    pub leverage: u32,
    #[serde(default)]
    pub liquidation_price: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
    /// Zero when the venue does not report it; see [`Position::margin`].
    #[serde(default)]
    pub margin_used: f64,
    #[serde(default)]
    pub opened_at: Option<TimeMs>,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.symbol.clone(), self.side)
    }

    /// Margin reported by the venue, or `quantity * mark / leverage`.
    pub fn margin(&self) -> f64 {
        if self.margin_used > 0.0 {
            return self.margin_used;
        }
        let leverage = self.leverage.max(1) as f64;
        self.quantity * self.mark_price / leverage
    }

    /// Unrealized P&L as a percentage of margin.
    pub fn unrealized_pnl_pct(&self) -> f64 {
        let margin = self.margin();
        if margin <= 0.0 {
            return 0.0;
        }
        self.unrealized_pnl / margin * 100.0
    }
}
