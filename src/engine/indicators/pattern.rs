//! Candlestick pattern recognition on the most recent bars.
//!
//! Every test is geometric: body and shadow lengths measured against the
//! bar's high-low range. Several patterns may fire on the same bar.

use crate::domain::Kline;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlePattern {
    Doji,
    Hammer,
    InvertedHammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
}

const DOJI_BODY_RATIO: f64 = 0.1;
const SHADOW_TO_BODY: f64 = 2.0;
const SOLDIER_BODY_RATIO: f64 = 0.5;

fn is_doji(bar: &Kline) -> bool {
    bar.range() > 0.0 && bar.body() <= DOJI_BODY_RATIO * bar.range()
}

fn is_hammer(bar: &Kline) -> bool {
    bar.range() > 0.0
        && bar.lower_shadow() >= SHADOW_TO_BODY * bar.body()
        && bar.upper_shadow() <= bar.body()
}

fn has_long_upper_shadow(bar: &Kline) -> bool {
    bar.range() > 0.0
        && bar.upper_shadow() >= SHADOW_TO_BODY * bar.body()
        && bar.lower_shadow() <= bar.body()
}

fn is_bullish_engulfing(prev: &Kline, bar: &Kline) -> bool {
    prev.is_bearish()
        && bar.is_bullish()
        && bar.open <= prev.close
        && bar.close >= prev.open
        && bar.body() > prev.body()
}

fn is_bearish_engulfing(prev: &Kline, bar: &Kline) -> bool {
    prev.is_bullish()
        && bar.is_bearish()
        && bar.open >= prev.close
        && bar.close <= prev.open
        && bar.body() > prev.body()
}

fn is_strong_body(bar: &Kline) -> bool {
    bar.range() > 0.0 && bar.body() >= SOLDIER_BODY_RATIO * bar.range()
}

fn is_three_white_soldiers(bars: &[Kline]) -> bool {
    bars.iter().all(|b| b.is_bullish() && is_strong_body(b))
        && bars.windows(2).all(|w| {
            w[1].close > w[0].close && w[1].open > w[0].open && w[1].open <= w[0].close
        })
}

fn is_three_black_crows(bars: &[Kline]) -> bool {
    bars.iter().all(|b| b.is_bearish() && is_strong_body(b))
        && bars.windows(2).all(|w| {
            w[1].close < w[0].close && w[1].open < w[0].open && w[1].open >= w[0].close
        })
}

/// Patterns completed by the latest bar.
pub fn detect_patterns(klines: &[Kline]) -> Vec<CandlePattern> {
    let mut patterns = Vec::new();
    let Some(last) = klines.last() else {
        return patterns;
    };

    if is_doji(last) {
        patterns.push(CandlePattern::Doji);
    }
    if is_hammer(last) {
        patterns.push(CandlePattern::Hammer);
    }
    if has_long_upper_shadow(last) {
        if last.is_bearish() {
            patterns.push(CandlePattern::ShootingStar);
        } else {
            patterns.push(CandlePattern::InvertedHammer);
        }
    }

    if klines.len() >= 2 {
        let prev = &klines[klines.len() - 2];
        if is_bullish_engulfing(prev, last) {
            patterns.push(CandlePattern::BullishEngulfing);
        }
        if is_bearish_engulfing(prev, last) {
            patterns.push(CandlePattern::BearishEngulfing);
        }
    }

    if klines.len() >= 3 {
        let tail = &klines[klines.len() - 3..];
        if is_three_white_soldiers(tail) {
            patterns.push(CandlePattern::ThreeWhiteSoldiers);
        }
        if is_three_black_crows(tail) {
            patterns.push(CandlePattern::ThreeBlackCrows);
        }
    }

    patterns
}
