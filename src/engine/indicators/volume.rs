//! Volume-weighted measures: OBV, VWMA, VWAP.

use crate::domain::Kline;

/// On-balance volume accumulated over the whole series.
pub fn obv(klines: &[Kline]) -> f64 {
    klines.windows(2).fold(0.0, |acc, w| {
        if w[1].close > w[0].close {
            acc + w[1].volume
        } else if w[1].close < w[0].close {
            acc - w[1].volume
        } else {
            acc
        }
    })
}

/// Volume-weighted moving average of closes over the last `period` bars.
pub fn vwma(klines: &[Kline], period: usize) -> f64 {
    if period == 0 || klines.len() < period {
        return 0.0;
    }
    let window = &klines[klines.len() - period..];
    let volume: f64 = window.iter().map(|k| k.volume).sum();
    if volume == 0.0 {
        return 0.0;
    }
    window.iter().map(|k| k.close * k.volume).sum::<f64>() / volume
}

/// Volume-weighted average typical price across the whole series.
pub fn vwap(klines: &[Kline]) -> f64 {
    let volume: f64 = klines.iter().map(|k| k.volume).sum();
    if volume == 0.0 {
        return 0.0;
    }
    klines
        .iter()
        .map(|k| k.typical_price() * k.volume)
        .sum::<f64>()
        / volume
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::indicators::test_support::assert_approx;

    fn bar(close: f64, volume: f64) -> Kline {
        Kline::new(0, close, close, close, close, volume)
    }

    #[test]
    fn obv_adds_up_days_and_subtracts_down_days() {
        let bars = vec![bar(10.0, 100.0), bar(11.0, 50.0), bar(11.0, 70.0), bar(9.0, 20.0)];
        assert_approx(obv(&bars), 30.0, 1e-12);
        assert_eq!(obv(&bars[..1]), 0.0);
    }

    #[test]
    fn vwma_weights_by_volume() {
        let bars = vec![bar(10.0, 1.0), bar(20.0, 3.0)];
        assert_approx(vwma(&bars, 2), 17.5, 1e-12);
        assert_eq!(vwma(&bars, 3), 0.0);
    }

    #[test]
    fn vwma_zero_volume() {
        let bars = vec![bar(10.0, 0.0), bar(20.0, 0.0)];
        assert_eq!(vwma(&bars, 2), 0.0);
    }

    #[test]
    fn vwap_uses_typical_price() {
        let bars = vec![
            Kline::new(0, 10.0, 12.0, 9.0, 12.0, 2.0),
            Kline::new(1, 12.0, 15.0, 12.0, 15.0, 2.0),
        ];
        // typical prices 11 and 14, equal volume
        assert_approx(vwap(&bars), 12.5, 1e-12);
        assert_eq!(vwap(&[]), 0.0);
    }
}
