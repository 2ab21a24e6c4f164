//! Decision-cycle records: one append-only row per scheduler tick.

use super::{Action, Balance, Decision, Position, TimeMs};
use serde::{Deserialize, Serialize};

/// Account view assembled at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub total_equity: f64,
    pub wallet_balance: f64,
    pub unrealized_pnl: f64,
    pub available_balance: f64,
    /// Equity minus the configured initial balance.
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub margin_used: f64,
    pub margin_used_pct: f64,
    pub position_count: usize,
}

impl AccountSnapshot {
    pub fn compute(balance: &Balance, positions: &[Position], initial_balance: f64) -> Self {
        let total_equity = balance.total_equity();
        let total_pnl = total_equity - initial_balance;
        let margin_used: f64 = positions.iter().map(Position::margin).sum();
        Self {
            total_equity,
            wallet_balance: balance.wallet_balance,
            unrealized_pnl: balance.unrealized_profit,
            available_balance: balance.available_balance,
            total_pnl,
            total_pnl_pct: if initial_balance > 0.0 {
                total_pnl / initial_balance * 100.0
            } else {
                0.0
            },
            margin_used,
            margin_used_pct: if total_equity > 0.0 {
                margin_used / total_equity * 100.0
            } else {
                0.0
            },
            position_count: positions.len(),
        }
    }
}

/// Result of executing one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub action: Action,
    pub symbol: String,
    pub quantity: f64,
    pub leverage: u32,
    pub price: f64,
    pub order_id: Option<String>,
    pub timestamp: TimeMs,
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn pending(decision: &Decision) -> Self {
        Self {
            action: decision.action,
            symbol: decision.symbol.clone(),
            quantity: 0.0,
            leverage: decision.leverage,
            price: 0.0,
            order_id: None,
            timestamp: TimeMs::now(),
            success: false,
            error: None,
        }
    }
}

/// Everything observed and done during one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCycleRecord {
    pub cycle_number: u64,
    pub timestamp: TimeMs,
    pub account: Option<AccountSnapshot>,
    pub positions: Vec<Position>,
    pub candidate_symbols: Vec<String>,
    pub prompt: Option<String>,
    pub cot_trace: Option<String>,
    /// Decisions as returned by the provider, before priority sorting.
    pub decisions: Vec<Decision>,
    pub executions: Vec<ExecutionOutcome>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl DecisionCycleRecord {
    pub fn new(cycle_number: u64, timestamp: TimeMs) -> Self {
        Self {
            cycle_number,
            timestamp,
            account: None,
            positions: Vec::new(),
            candidate_symbols: Vec::new(),
            prompt: None,
            cot_trace: None,
            decisions: Vec::new(),
            executions: Vec::new(),
            success: false,
            error_message: None,
        }
    }

    /// Mark the cycle failed with `message`.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        self.error_message = Some(message.into());
    }

    pub fn total_equity(&self) -> Option<f64> {
        self.account.map(|a| a.total_equity)
    }
}

/// A textual lesson distilled from recent outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSummary {
    pub id: i64,
    pub summary: String,
    pub trades_analyzed: usize,
    pub created_at: TimeMs,
    pub is_active: bool,
}
