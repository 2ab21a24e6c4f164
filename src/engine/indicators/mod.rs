//! Technical indicators over OHLCV series.
//!
//! Every function takes bars ordered oldest to newest and degrades to `0.0`
//! (or `None` for composite outputs) when the history is shorter than the
//! window. Nothing is cached; callers decide how often to recompute.

pub mod levels;
pub mod momentum;
pub mod pattern;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use levels::{pivot_points, support_resistance, PivotPoints, SupportResistance};
pub use momentum::{cci, rsi, stochastic, williams_r, Stochastic};
pub use pattern::{detect_patterns, CandlePattern};
pub use trend::{ema, macd, sma};
pub use volatility::{atr, bollinger, historical_volatility, BollingerBands};
pub use volume::{obv, vwap, vwma};

use crate::domain::Kline;
use serde::{Deserialize, Serialize};

/// Indicator bundle for one symbol, fed to the decision provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub price: f64,
    /// Change from the first to the last close of the series, in percent.
    pub price_change_pct: f64,
    pub ema20: f64,
    pub ema50: f64,
    pub macd: f64,
    pub rsi7: f64,
    pub rsi14: f64,
    pub atr14: f64,
    pub bollinger: Option<BollingerBands>,
    pub stochastic: Option<Stochastic>,
    pub williams_r: f64,
    pub cci: f64,
    pub obv: f64,
    pub vwma20: f64,
    pub vwap: f64,
    pub historical_volatility: f64,
    pub pivots: Option<PivotPoints>,
    pub levels: SupportResistance,
    pub patterns: Vec<CandlePattern>,
}

impl MarketSnapshot {
    pub fn compute(klines: &[Kline]) -> Self {
        let Some(last) = klines.last() else {
            return Self::default();
        };
        let first = klines[0].close;
        let price_change_pct = if first != 0.0 {
            (last.close - first) / first * 100.0
        } else {
            0.0
        };

        Self {
            price: last.close,
            price_change_pct,
            ema20: ema(klines, 20),
            ema50: ema(klines, 50),
            macd: macd(klines),
            rsi7: rsi(klines, 7),
            rsi14: rsi(klines, 14),
            atr14: atr(klines, 14),
            bollinger: bollinger(klines, 20, 2.0),
            stochastic: stochastic(klines, 14, 3),
            williams_r: williams_r(klines, 14),
            cci: cci(klines, 20),
            obv: obv(klines),
            vwma20: vwma(klines, 20),
            vwap: vwap(klines),
            historical_volatility: historical_volatility(klines, 20),
            pivots: pivot_points(klines),
            levels: support_resistance(klines),
            patterns: detect_patterns(klines),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::Kline;

    /// Relative comparison, falling back to absolute near zero.
    pub fn assert_approx(actual: f64, expected: f64, tol: f64) {
        let scale = expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tol * scale,
            "expected {expected}, got {actual}"
        );
    }

    /// Bars whose open is the previous close and whose wicks hug the body.
    pub fn bars_from_closes(closes: &[f64]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Kline::new(
                    i as i64 * 60_000,
                    open,
                    open.max(close),
                    open.min(close),
                    close,
                    1000.0,
                )
            })
            .collect()
    }
}
