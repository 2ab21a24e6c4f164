//! Oscillators: RSI, Stochastic, Williams %R, CCI.

use super::trend::sma;
use crate::domain::Kline;
use serde::{Deserialize, Serialize};

/// Relative Strength Index with Wilder smoothing.
///
/// Needs `period + 1` bars. Returns 100 when the average loss is exactly 0.
pub fn rsi(klines: &[Kline], period: usize) -> f64 {
    if period == 0 || klines.len() <= period {
        return 0.0;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = klines[i].close - klines[i - 1].close;
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let p = period as f64;
    for i in (period + 1)..klines.len() {
        let change = klines[i].close - klines[i - 1].close;
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

/// Raw %K for the window ending at `end` (inclusive).
fn percent_k(klines: &[Kline], end: usize, period: usize) -> f64 {
    let window = &klines[end + 1 - period..=end];
    let highest = window.iter().map(|k| k.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|k| k.low).fold(f64::MAX, f64::min);
    if highest == lowest {
        return 50.0;
    }
    (klines[end].close - lowest) / (highest - lowest) * 100.0
}

/// Stochastic oscillator; %D is the SMA of the last `d_period` %K values.
pub fn stochastic(klines: &[Kline], k_period: usize, d_period: usize) -> Option<Stochastic> {
    if k_period == 0 || d_period == 0 || klines.len() < k_period + d_period - 1 {
        return None;
    }

    let last = klines.len() - 1;
    let ks: Vec<f64> = (last + 1 - d_period..=last)
        .map(|end| percent_k(klines, end, k_period))
        .collect();

    Some(Stochastic {
        k: ks[ks.len() - 1],
        d: sma(&ks, d_period),
    })
}

/// Williams %R in [-100, 0]; -50 on a flat window.
pub fn williams_r(klines: &[Kline], period: usize) -> f64 {
    if period == 0 || klines.len() < period {
        return 0.0;
    }
    let window = &klines[klines.len() - period..];
    let highest = window.iter().map(|k| k.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|k| k.low).fold(f64::MAX, f64::min);
    if highest == lowest {
        return -50.0;
    }
    let close = klines[klines.len() - 1].close;
    (highest - close) / (highest - lowest) * -100.0
}

/// Commodity Channel Index over typical prices.
pub fn cci(klines: &[Kline], period: usize) -> f64 {
    if period == 0 || klines.len() < period {
        return 0.0;
    }
    let typical: Vec<f64> = klines[klines.len() - period..]
        .iter()
        .map(Kline::typical_price)
        .collect();
    let mean = sma(&typical, period);
    let mean_deviation = typical.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;
    if mean_deviation == 0.0 {
        return 0.0;
    }
    (typical[period - 1] - mean) / (0.015 * mean_deviation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::indicators::test_support::{assert_approx, bars_from_closes};

    #[test]
    fn rsi_all_gains_is_100() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        assert_approx(rsi(&bars, 3), 100.0, 1e-12);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let bars = bars_from_closes(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0]);
        assert_approx(rsi(&bars, 3), 0.0, 1e-12);
    }

    #[test]
    fn rsi_flat_series_returns_100_on_zero_loss() {
        let bars = bars_from_closes(&[10.0; 10]);
        assert_eq!(rsi(&bars, 3), 100.0);
    }

    #[test]
    fn rsi_seed_only() {
        // changes +0.34, -0.25, -0.48 -> gain 0.34/3, loss 0.73/3
        let bars = bars_from_closes(&[44.0, 44.34, 44.09, 43.61]);
        let expected = 100.0 - 100.0 / (1.0 + 0.34 / 0.73);
        assert_approx(rsi(&bars, 3), expected, 1e-9);
    }

    #[test]
    fn rsi_wilder_step() {
        // seed: gain 0.34/3, loss 0.73/3; next change +0.72
        let bars = bars_from_closes(&[44.0, 44.34, 44.09, 43.61, 44.33]);
        let gain = (0.34 / 3.0 * 2.0 + 0.72) / 3.0;
        let loss = (0.73 / 3.0 * 2.0) / 3.0;
        let expected = 100.0 - 100.0 / (1.0 + gain / loss);
        assert_approx(rsi(&bars, 3), expected, 1e-9);
    }

    #[test]
    fn rsi_insufficient_history() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        assert_eq!(rsi(&bars, 3), 0.0);
    }

    #[test]
    fn stochastic_close_at_high() {
        let bars = vec![
            Kline::new(0, 10.0, 12.0, 8.0, 11.0, 1.0),
            Kline::new(1, 11.0, 13.0, 9.0, 12.0, 1.0),
            Kline::new(2, 12.0, 14.0, 10.0, 14.0, 1.0),
        ];
        let s = stochastic(&bars, 3, 1).unwrap();
        assert_approx(s.k, 100.0, 1e-12);
        assert_approx(s.d, 100.0, 1e-12);
    }

    #[test]
    fn stochastic_d_averages_k() {
        let bars = vec![
            Kline::new(0, 10.0, 10.0, 0.0, 5.0, 1.0),
            Kline::new(1, 10.0, 10.0, 0.0, 10.0, 1.0),
        ];
        // %K(1)=50, %K(1)=100 over 1-bar windows; %D = 75
        let s = stochastic(&bars, 1, 2).unwrap();
        assert_approx(s.k, 100.0, 1e-12);
        assert_approx(s.d, 75.0, 1e-12);
    }

    #[test]
    fn stochastic_insufficient_history() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        assert!(stochastic(&bars, 3, 3).is_none());
    }

    #[test]
    fn williams_r_bounds() {
        let bars = vec![
            Kline::new(0, 10.0, 20.0, 10.0, 15.0, 1.0),
            Kline::new(1, 15.0, 20.0, 10.0, 10.0, 1.0),
        ];
        assert_approx(williams_r(&bars, 2), -100.0, 1e-12);
        let flat = bars_from_closes(&[5.0, 5.0]);
        // bars_from_closes gives high = low = close on flat input
        assert_approx(williams_r(&flat, 2), -50.0, 1e-12);
    }

    #[test]
    fn cci_zero_on_flat_series() {
        let bars = bars_from_closes(&[10.0; 20]);
        assert_eq!(cci(&bars, 20), 0.0);
    }

    #[test]
    fn cci_positive_when_last_typical_price_above_mean() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert!(cci(&bars_from_closes(&closes), 20) > 0.0);
    }
}
