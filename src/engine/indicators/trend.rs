//! Moving averages and MACD.

use crate::domain::Kline;

/// Simple mean of the last `period` values; 0 when fewer are available.
pub fn sma(values: &[f64], period: usize) -> f64 {
    if period == 0 || values.len() < period {
        return 0.0;
    }
    values[values.len() - period..].iter().sum::<f64>() / period as f64
}

/// Exponential moving average of closes.
///
/// Seeded with the simple average of the first `period` closes, then
/// `ema += (close - ema) * 2 / (period + 1)` over the remaining bars.
pub fn ema(klines: &[Kline], period: usize) -> f64 {
    if period == 0 || klines.len() < period {
        return 0.0;
    }

    let seed = klines[..period].iter().map(|k| k.close).sum::<f64>() / period as f64;
    let multiplier = 2.0 / (period as f64 + 1.0);

    klines[period..]
        .iter()
        .fold(seed, |ema, k| (k.close - ema) * multiplier + ema)
}

/// EMA(12) - EMA(26); 0 with fewer than 26 bars.
pub fn macd(klines: &[Kline]) -> f64 {
    if klines.len() < 26 {
        return 0.0;
    }
    ema(klines, 12) - ema(klines, 26)
}
