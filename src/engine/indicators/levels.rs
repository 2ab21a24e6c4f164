//! Price levels: classic pivot points and swing support/resistance.

use crate::domain::Kline;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotPoints {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Classic floor pivots computed from the latest bar.
pub fn pivot_points(klines: &[Kline]) -> Option<PivotPoints> {
    let bar = klines.last()?;
    let (high, low, close) = (bar.high, bar.low, bar.close);
    let pivot = (high + low + close) / 3.0;
    let range = high - low;

    Some(PivotPoints {
        pivot,
        r1: 2.0 * pivot - low,
        r2: pivot + range,
        r3: high + 2.0 * (pivot - low),
        s1: 2.0 * pivot - high,
        s2: pivot - range,
        s3: low - 2.0 * (high - pivot),
    })
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportResistance {
    /// Swing lows, ascending.
    pub supports: Vec<f64>,
    /// Swing highs, ascending.
    pub resistances: Vec<f64>,
}

const SWING_RADIUS: usize = 2;

/// Local extrema over a 5-bar window (two bars either side).
pub fn support_resistance(klines: &[Kline]) -> SupportResistance {
    let mut levels = SupportResistance::default();
    if klines.len() < 2 * SWING_RADIUS + 1 {
        return levels;
    }

    for i in SWING_RADIUS..klines.len() - SWING_RADIUS {
        let neighbours = (i - SWING_RADIUS..=i + SWING_RADIUS).filter(|&j| j != i);
        let (mut is_high, mut is_low) = (true, true);
        for j in neighbours {
            is_high &= klines[i].high > klines[j].high;
            is_low &= klines[i].low < klines[j].low;
        }
        if is_high {
            levels.resistances.push(klines[i].high);
        }
        if is_low {
            levels.supports.push(klines[i].low);
        }
    }

    for side in [&mut levels.supports, &mut levels.resistances] {
        side.sort_by(|a, b| a.total_cmp(b));
        side.dedup();
    }
    levels
}
