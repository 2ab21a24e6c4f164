//! Trading decisions produced by the decision provider.

use super::{PositionKey, PositionSide};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    Hold,
    Wait,
}

impl Action {
    /// Execution priority: closes (1) free margin before opens (2); hold/wait last (3).
    pub fn priority(&self) -> u8 {
        match self {
            Action::CloseLong | Action::CloseShort => 1,
            Action::OpenLong | Action::OpenShort => 2,
            Action::Hold | Action::Wait => 3,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Action::OpenLong | Action::OpenShort)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Action::CloseLong | Action::CloseShort)
    }

    /// Position side this action acts on; `None` for hold/wait.
    pub fn side(&self) -> Option<PositionSide> {
        match self {
            Action::OpenLong | Action::CloseLong => Some(PositionSide::Long),
            Action::OpenShort | Action::CloseShort => Some(PositionSide::Short),
            Action::Hold | Action::Wait => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::OpenLong => "open_long",
            Action::OpenShort => "open_short",
            Action::CloseLong => "close_long",
            Action::CloseShort => "close_short",
            Action::Hold => "hold",
            Action::Wait => "wait",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decision; consumed exactly once by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub symbol: String,
    pub action: Action,
    #[serde(default)]
    pub leverage: u32,
    #[serde(default, rename = "positionSizeUSD", alias = "positionSizeUsd")]
    pub position_size_usd: f64,
    #[serde(default)]
    pub stop_loss: f64,
    #[serde(default)]
    pub take_profit: f64,
    #[serde(default)]
    pub confidence: u32,
    #[serde(default)]
    pub reasoning: String,
}

impl Decision {
    /// Bare decision with no sizing; handy for closes and holds.
    pub fn new(symbol: impl Into<String>, action: Action) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            leverage: 0,
            position_size_usd: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            confidence: 0,
            reasoning: String::new(),
        }
    }

    pub fn key(&self) -> Option<PositionKey> {
        self.action
            .side()
            .map(|side| PositionKey::new(self.symbol.clone(), side))
    }
}

/// Stable sort by action priority; relative order within a priority is kept.
pub fn sort_by_priority(decisions: &[Decision]) -> Vec<Decision> {
    let mut sorted = decisions.to_vec();
    sorted.sort_by_key(|d| d.action.priority());
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_sort_puts_closes_first() {
        let decisions = vec![
            Decision::new("A", Action::OpenLong),
            Decision::new("B", Action::CloseShort),
            Decision::new("C", Action::Hold),
        ];
        let sorted = sort_by_priority(&decisions);
        let order: Vec<_> = sorted.iter().map(|d| d.symbol.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_priority_sort_is_stable() {
        let decisions = vec![
            Decision::new("W", Action::Wait),
            Decision::new("O1", Action::OpenShort),
            Decision::new("C1", Action::CloseLong),
            Decision::new("O2", Action::OpenLong),
            Decision::new("C2", Action::CloseShort),
            Decision::new("H", Action::Hold),
        ];
        let sorted = sort_by_priority(&decisions);
        let order: Vec<_> = sorted.iter().map(|d| d.symbol.as_str()).collect();
        assert_eq!(order, vec!["C1", "C2", "O1", "O2", "W", "H"]);
    }

    #[test]
    fn test_decision_deserializes_provider_json() {
        let json = r#"{
            "action": "open_short",
            "symbol": "ETHUSDT",
            "leverage": 5,
            "positionSizeUSD": 200,
            "stopLoss": 3100.5,
            "takeProfit": 2800,
            "confidence": 80,
            "reasoning": "breakdown"
        }"#;
        let d: Decision = serde_json::from_str(json).unwrap();
        assert_eq!(d.action, Action::OpenShort);
        assert_eq!(d.leverage, 5);
        assert_eq!(d.position_size_usd, 200.0);
        assert_eq!(d.key(), Some(PositionKey::new("ETHUSDT", PositionSide::Short)));
    }

    #[test]
    fn test_hold_has_no_key() {
        let json = r#"{"action":"hold","symbol":"BTCUSDT"}"#;
        let d: Decision = serde_json::from_str(json).unwrap();
        assert_eq!(d.key(), None);
        assert_eq!(d.leverage, 0);
    }
}
