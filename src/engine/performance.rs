//! Performance analysis over recorded trade outcomes and the equity curve.

use super::outcome::build_outcome;
use crate::domain::{
    CloseEvent, CloseTrigger, DecisionCycleRecord, FillSource, PositionKey, PositionSide, TimeMs,
    TradeOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Stand-in for an unbounded ratio (wins with no losses, zero-variance returns).
pub const RATIO_SENTINEL: f64 = 999.0;

/// Relative spread of per-cycle returns (stdev / |mean|) at or below which
/// the returns count as constant, e.g. steady linear equity growth.
pub const FLAT_SPREAD: f64 = 0.05;

pub const RECONSTRUCTED_REASON: &str = "reconstructed from decision log";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideStats {
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolStats {
    pub symbol: String,
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Winners / total, in [0, 1].
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub total_pnl: f64,
    pub long: SideStats,
    pub short: SideStats,
    pub symbols: BTreeMap<String, SymbolStats>,
    pub best_symbol: Option<String>,
    pub worst_symbol: Option<String>,
    pub sharpe_ratio: f64,
    /// Most recent outcomes, newest first.
    pub recent_trades: Vec<TradeOutcome>,
}

const RECENT_TRADES: usize = 10;

fn side_stats(outcomes: &[&TradeOutcome]) -> SideStats {
    let trades = outcomes.len();
    let wins = outcomes.iter().filter(|o| o.is_win()).count();
    let total_pnl: f64 = outcomes.iter().map(|o| o.pnl).sum();
    SideStats {
        trades,
        wins,
        win_rate: ratio(wins, trades),
        total_pnl,
        avg_pnl: if trades > 0 {
            total_pnl / trades as f64
        } else {
            0.0
        },
    }
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

/// Gross win / |gross loss|; [`RATIO_SENTINEL`] with wins and no losses.
pub fn profit_factor(outcomes: &[TradeOutcome]) -> f64 {
    let gross_win: f64 = outcomes.iter().filter(|o| o.pnl > 0.0).map(|o| o.pnl).sum();
    let gross_loss: f64 = outcomes.iter().filter(|o| o.pnl < 0.0).map(|o| o.pnl).sum();
    if gross_loss == 0.0 {
        return if gross_win > 0.0 { RATIO_SENTINEL } else { 0.0 };
    }
    gross_win / gross_loss.abs()
}

/// Period Sharpe ratio of an equity series (not annualized).
///
/// Returns whose spread is within [`FLAT_SPREAD`] of the mean count as zero
/// variance and yield `+/-RATIO_SENTINEL` by the sign of the mean, or 0.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.is_empty() {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev <= FLAT_SPREAD * mean.abs() {
        return if mean > 0.0 {
            RATIO_SENTINEL
        } else if mean < 0.0 {
            -RATIO_SENTINEL
        } else {
            0.0
        };
    }
    mean / std_dev
}

/// Summarize `outcomes` (newest first, as the store returns them) and the
/// equity series (oldest first).
pub fn analyze(outcomes: &[TradeOutcome], equity: &[f64]) -> PerformanceSummary {
    let winners: Vec<&TradeOutcome> = outcomes.iter().filter(|o| o.is_win()).collect();
    let losers: Vec<&TradeOutcome> = outcomes.iter().filter(|o| o.pnl < 0.0).collect();

    let avg = |xs: &[&TradeOutcome]| {
        if xs.is_empty() {
            0.0
        } else {
            xs.iter().map(|o| o.pnl).sum::<f64>() / xs.len() as f64
        }
    };

    let longs: Vec<&TradeOutcome> = outcomes
        .iter()
        .filter(|o| o.side == PositionSide::Long)
        .collect();
    let shorts: Vec<&TradeOutcome> = outcomes
        .iter()
        .filter(|o| o.side == PositionSide::Short)
        .collect();

    let mut by_symbol: BTreeMap<String, Vec<&TradeOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        by_symbol
            .entry(outcome.symbol.clone())
            .or_default()
            .push(outcome);
    }
    let symbols: BTreeMap<String, SymbolStats> = by_symbol
        .into_iter()
        .map(|(symbol, trades)| {
            let stats = side_stats(&trades);
            (
                symbol.clone(),
                SymbolStats {
                    symbol,
                    trades: stats.trades,
                    wins: stats.wins,
                    win_rate: stats.win_rate,
                    total_pnl: stats.total_pnl,
                    avg_pnl: stats.avg_pnl,
                },
            )
        })
        .collect();

    let best_symbol = symbols
        .values()
        .max_by(|a, b| a.total_pnl.total_cmp(&b.total_pnl))
        .map(|s| s.symbol.clone());
    let worst_symbol = symbols
        .values()
        .min_by(|a, b| a.total_pnl.total_cmp(&b.total_pnl))
        .map(|s| s.symbol.clone());

    PerformanceSummary {
        total_trades: outcomes.len(),
        winning_trades: winners.len(),
        losing_trades: losers.len(),
        win_rate: ratio(winners.len(), outcomes.len()),
        avg_win: avg(&winners),
        avg_loss: avg(&losers),
        profit_factor: profit_factor(outcomes),
        total_pnl: outcomes.iter().map(|o| o.pnl).sum(),
        long: side_stats(&longs),
        short: side_stats(&shorts),
        symbols,
        best_symbol,
        worst_symbol,
        sharpe_ratio: sharpe_ratio(equity),
        recent_trades: outcomes.iter().take(RECENT_TRADES).cloned().collect(),
    }
}

struct OpenLeg {
    price: f64,
    quantity: f64,
    leverage: u32,
    time: TimeMs,
}

/// Rebuild outcomes by pairing successful open/close executions.
///
/// `records` must be oldest first. Closes with no preceding open in the
/// window are skipped.
pub fn reconstruct_outcomes(
    records: &[DecisionCycleRecord],
    premature_minutes: i64,
) -> Vec<TradeOutcome> {
    let mut open_legs: HashMap<PositionKey, OpenLeg> = HashMap::new();
    let mut outcomes = Vec::new();

    for execution in records.iter().flat_map(|r| r.executions.iter()) {
        if !execution.success {
            continue;
        }
        let Some(side) = execution.action.side() else {
            continue;
        };
        let key = PositionKey::new(execution.symbol.clone(), side);

        if execution.action.is_open() {
            open_legs.insert(
                key,
                OpenLeg {
                    price: execution.price,
                    quantity: execution.quantity,
                    leverage: execution.leverage,
                    time: execution.timestamp,
                },
            );
        } else if let Some(open) = open_legs.remove(&key) {
            let quantity = if execution.quantity > 0.0 {
                execution.quantity
            } else {
                open.quantity
            };
            let event = CloseEvent {
                symbol: key.symbol,
                side,
                leverage: open.leverage,
                entry_price: open.price,
                close_price: execution.price,
                quantity,
                realized_pnl: None,
                opened_at: open.time,
                closed_at: execution.timestamp,
                trigger: CloseTrigger::Decision,
                fill_source: FillSource::Order,
                entry_reason: RECONSTRUCTED_REASON.to_string(),
                exit_reason: RECONSTRUCTED_REASON.to_string(),
            };
            outcomes.push(build_outcome(&event, premature_minutes));
        }
    }

    outcomes
}
