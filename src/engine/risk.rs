//! Risk governor: daily P&L rollover and the post-breach cooldown window.

use crate::domain::TimeMs;
use serde::{Deserialize, Serialize};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskState {
    pub daily_pnl: f64,
    pub last_reset_time: TimeMs,
    /// Trading is suspended while `now < stop_until`.
    pub stop_until: Option<TimeMs>,
}

/// Which threshold tripped the cooldown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskBreach {
    DailyLoss { loss_pct: f64, limit_pct: f64 },
    Drawdown { drawdown_pct: f64, limit_pct: f64 },
}

impl std::fmt::Display for RiskBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskBreach::DailyLoss {
                loss_pct,
                limit_pct,
            } => write!(f, "daily loss {:.2}% reached limit {:.2}%", loss_pct, limit_pct),
            RiskBreach::Drawdown {
                drawdown_pct,
                limit_pct,
            } => write!(
                f,
                "drawdown {:.2}% reached limit {:.2}%",
                drawdown_pct, limit_pct
            ),
        }
    }
}

/// Loss thresholds, evaluated by the orchestrator against the account snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLimits {
    pub max_daily_loss_pct: f64,
    pub max_drawdown_pct: f64,
}

impl RiskLimits {
    pub fn check(&self, daily_pnl: f64, equity: f64, initial_balance: f64) -> Option<RiskBreach> {
        if initial_balance <= 0.0 {
            return None;
        }
        let loss_pct = -daily_pnl / initial_balance * 100.0;
        if self.max_daily_loss_pct > 0.0 && loss_pct >= self.max_daily_loss_pct {
            return Some(RiskBreach::DailyLoss {
                loss_pct,
                limit_pct: self.max_daily_loss_pct,
            });
        }
        let drawdown_pct = (initial_balance - equity) / initial_balance * 100.0;
        if self.max_drawdown_pct > 0.0 && drawdown_pct >= self.max_drawdown_pct {
            return Some(RiskBreach::Drawdown {
                drawdown_pct,
                limit_pct: self.max_drawdown_pct,
            });
        }
        None
    }
}

/// Active -> Cooldown -> Active. Sole mutator of [`RiskState`].
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    state: RiskState,
    cooldown_minutes: i64,
}

impl RiskGovernor {
    pub fn new(cooldown_minutes: i64, now: TimeMs) -> Self {
        Self {
            state: RiskState {
                daily_pnl: 0.0,
                last_reset_time: now,
                stop_until: None,
            },
            cooldown_minutes,
        }
    }

    pub fn state(&self) -> RiskState {
        self.state
    }

    /// Remaining cooldown in minutes (rounded up), or `None` when active.
    pub fn cooldown_remaining(&self, now: TimeMs) -> Option<i64> {
        match self.state.stop_until {
            Some(until) if now < until => {
                let remaining_ms = until.as_i64() - now.as_i64();
                Some((remaining_ms + 59_999) / 60_000)
            }
            _ => None,
        }
    }

    pub fn is_cooling_down(&self, now: TimeMs) -> bool {
        self.cooldown_remaining(now).is_some()
    }

    /// Zero the daily P&L when more than 24h passed since the last reset.
    pub fn reset_daily_if_due(&mut self, now: TimeMs) -> bool {
        if now.as_i64() - self.state.last_reset_time.as_i64() > DAY_MS {
            self.state.daily_pnl = 0.0;
            self.state.last_reset_time = now;
            return true;
        }
        false
    }

    pub fn record_pnl(&mut self, pnl: f64) {
        self.state.daily_pnl += pnl;
    }

    /// Enter cooldown for the configured duration.
    pub fn trip(&mut self, now: TimeMs) -> TimeMs {
        let until = now.plus_minutes(self.cooldown_minutes);
        self.state.stop_until = Some(until);
        until
    }

    /// Enter cooldown until an explicit deadline.
    pub fn stop_until(&mut self, until: TimeMs) {
        self.state.stop_until = Some(until);
    }
}
