//! Volatility measures: ATR, Bollinger Bands, historical volatility.

use crate::domain::Kline;
use serde::{Deserialize, Serialize};

fn true_range(current: &Kline, prev_close: f64) -> f64 {
    let hl = current.high - current.low;
    let hc = (current.high - prev_close).abs();
    let lc = (current.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Average True Range, Wilder-smoothed like RSI. Needs `period + 1` bars.
pub fn atr(klines: &[Kline], period: usize) -> f64 {
    if period == 0 || klines.len() <= period {
        return 0.0;
    }

    let trs: Vec<f64> = klines
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();

    let p = period as f64;
    let seed = trs[..period].iter().sum::<f64>() / p;
    trs[period..]
        .iter()
        .fold(seed, |atr, tr| (atr * (p - 1.0) + tr) / p)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Position of the latest close within the band: 0 = lower, 1 = upper.
    pub percent_b: f64,
    /// Band width as a percentage of the middle band.
    pub width_pct: f64,
}

/// Bollinger Bands using the population standard deviation.
pub fn bollinger(klines: &[Kline], period: usize, multiplier: f64) -> Option<BollingerBands> {
    if period == 0 || klines.len() < period {
        return None;
    }
    let window = &klines[klines.len() - period..];
    let mean = window.iter().map(|k| k.close).sum::<f64>() / period as f64;
    let variance = window
        .iter()
        .map(|k| (k.close - mean).powi(2))
        .sum::<f64>()
        / period as f64;
    let std_dev = variance.sqrt();

    let upper = mean + multiplier * std_dev;
    let lower = mean - multiplier * std_dev;
    let close = window[period - 1].close;

    let percent_b = if upper > lower {
        (close - lower) / (upper - lower)
    } else {
        0.5
    };
    let width_pct = if mean != 0.0 {
        (upper - lower) / mean * 100.0
    } else {
        0.0
    };

    Some(BollingerBands {
        upper,
        middle: mean,
        lower,
        percent_b,
        width_pct,
    })
}

/// Annualized volatility of the last `period` log returns (sample stddev x sqrt(252)).
pub fn historical_volatility(klines: &[Kline], period: usize) -> f64 {
    if period < 2 || klines.len() <= period {
        return 0.0;
    }
    let returns: Vec<f64> = klines[klines.len() - period - 1..]
        .windows(2)
        .filter(|w| w[0].close > 0.0 && w[1].close > 0.0)
        .map(|w| (w[1].close / w[0].close).ln())
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt() * 252f64.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::indicators::test_support::{assert_approx, bars_from_closes};

    #[test]
    fn true_range_uses_gap_from_previous_close() {
        let bar = Kline::new(1, 12.0, 13.0, 12.0, 12.5, 1.0);
        assert_approx(true_range(&bar, 10.0), 3.0, 1e-12);
    }

    #[test]
    fn atr_constant_range() {
        let bars: Vec<Kline> = (0..10)
            .map(|i| Kline::new(i, 100.0, 102.0, 98.0, 100.0, 1.0))
            .collect();
        assert_approx(atr(&bars, 3), 4.0, 1e-12);
    }

    #[test]
    fn atr_insufficient_history() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        assert_eq!(atr(&bars, 3), 0.0);
    }

    #[test]
    fn bollinger_flat_series_has_zero_width() {
        let bars = bars_from_closes(&[10.0; 20]);
        let bb = bollinger(&bars, 20, 2.0).unwrap();
        assert_approx(bb.upper, 10.0, 1e-12);
        assert_approx(bb.lower, 10.0, 1e-12);
        assert_approx(bb.percent_b, 0.5, 1e-12);
        assert_approx(bb.width_pct, 0.0, 1e-12);
    }

    #[test]
    fn bollinger_known_values() {
        // closes 2,4,4,4,5,5,7,9: mean 5, population stddev 2
        let bars = bars_from_closes(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let bb = bollinger(&bars, 8, 2.0).unwrap();
        assert_approx(bb.middle, 5.0, 1e-12);
        assert_approx(bb.upper, 9.0, 1e-12);
        assert_approx(bb.lower, 1.0, 1e-12);
        assert_approx(bb.percent_b, 1.0, 1e-12);
        assert_approx(bb.width_pct, 160.0, 1e-12);
    }

    #[test]
    fn bollinger_insufficient_history() {
        assert!(bollinger(&bars_from_closes(&[1.0]), 20, 2.0).is_none());
    }

    #[test]
    fn historical_volatility_zero_for_constant_growth() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        assert_approx(historical_volatility(&bars_from_closes(&closes), 20), 0.0, 1e-9);
    }

    #[test]
    fn historical_volatility_positive_for_noisy_series() {
        let closes: Vec<f64> = (0..25)
            .map(|i| if i % 2 == 0 { 100.0 } else { 102.0 })
            .collect();
        assert!(historical_volatility(&bars_from_closes(&closes), 20) > 0.0);
    }
}
