//! Position reconciliation: diffing live positions against the tracked book
//! and estimating fill economics for positions the exchange closed on its own.

use crate::domain::{AccountTrade, FillSource, Position, PositionKey, TimeMs};
use std::collections::{HashMap, HashSet};

/// Trades within this distance of the reconciliation time count as the close.
pub const FILL_MATCH_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Positions tracked across cycles.
///
/// Position reads are eventually consistent: a position we just closed may
/// still be reported for a while, and one we just opened may not show up yet.
/// Both are held apart from `last_known` until the exchange catches up or the
/// settle window runs out.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    /// Reported by the exchange on the last positions read.
    pub last_known: HashMap<PositionKey, Position>,
    /// Open time of each tracked lifecycle.
    pub first_seen: HashMap<PositionKey, TimeMs>,
    /// Opened by us, not yet reported by the exchange.
    pub pending: HashMap<PositionKey, Position>,
    /// Closed by us, with the close time.
    pub recently_closed: HashMap<PositionKey, TimeMs>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcileDiff {
    /// Live now, but without a known open time.
    pub newly_seen: Vec<PositionKey>,
    /// Tracked last cycle, gone now. Carries the last snapshot of each.
    pub disappeared: Vec<Position>,
    /// Pending opens the exchange now reports.
    pub confirmed: Vec<PositionKey>,
    /// Still reported after we closed them, inside the settle window.
    pub stale: Vec<PositionKey>,
}

impl PositionBook {
    /// Compare the live set with the book as of `now`.
    pub fn diff(&self, live: &[Position], now: TimeMs, settle_window_ms: i64) -> ReconcileDiff {
        let within_window = |since: TimeMs| now.as_i64() - since.as_i64() < settle_window_ms;

        let live_keys: HashSet<PositionKey> = live.iter().map(Position::key).collect();
        let mut stale: Vec<PositionKey> = live_keys
            .iter()
            .filter(|key| self.recently_closed.get(*key).is_some_and(|t| within_window(*t)))
            .cloned()
            .collect();
        stale.sort();

        let mut newly_seen: Vec<PositionKey> = live_keys
            .iter()
            .filter(|key| !stale.contains(*key) && !self.first_seen.contains_key(*key))
            .cloned()
            .collect();
        newly_seen.sort();

        let mut confirmed: Vec<PositionKey> = self
            .pending
            .keys()
            .filter(|key| live_keys.contains(*key))
            .cloned()
            .collect();
        confirmed.sort();

        let vanished_pending = self.pending.iter().filter(|(key, position)| {
            !live_keys.contains(*key) && !position.opened_at.is_some_and(|t| within_window(t))
        });
        let mut disappeared: Vec<Position> = self
            .last_known
            .iter()
            .filter(|(key, _)| !live_keys.contains(*key))
            .chain(vanished_pending)
            .map(|(_, position)| position.clone())
            .collect();
        disappeared.sort_by_key(Position::key);

        ReconcileDiff {
            newly_seen,
            disappeared,
            confirmed,
            stale,
        }
    }

    /// Track a position we just opened.
    pub fn open(&mut self, mut position: Position, opened_at: TimeMs) {
        let key = position.key();
        position.opened_at = Some(opened_at);
        self.recently_closed.remove(&key);
        self.first_seen.insert(key.clone(), opened_at);
        self.pending.insert(key, position);
    }

    /// Forget a recorded lifecycle and remember when it closed.
    pub fn close(&mut self, key: &PositionKey, closed_at: TimeMs) {
        self.first_seen.remove(key);
        self.last_known.remove(key);
        self.pending.remove(key);
        self.recently_closed.insert(key.clone(), closed_at);
    }

    /// Fold a reconciliation pass back in. `unrecorded` are disappeared
    /// positions whose outcome could not be stored; they stay tracked so the
    /// next pass retries them.
    pub fn apply(&mut self, live: &[Position], diff: &ReconcileDiff, unrecorded: Vec<Position>) {
        let mut last_known: HashMap<PositionKey, Position> = live
            .iter()
            .filter(|p| !diff.stale.contains(&p.key()))
            .map(|p| (p.key(), p.clone()))
            .collect();
        for position in unrecorded {
            last_known.insert(position.key(), position);
        }
        let gone: HashSet<PositionKey> = diff.disappeared.iter().map(Position::key).collect();
        self.pending
            .retain(|key, _| !last_known.contains_key(key) && !gone.contains(key));
        self.recently_closed.retain(|key, _| diff.stale.contains(key));
        self.last_known = last_known;
    }

    /// Every position an open must not duplicate: confirmed or pending.
    pub fn open_keys(&self) -> Vec<PositionKey> {
        let mut keys: Vec<PositionKey> = self
            .last_known
            .keys()
            .chain(self.pending.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.last_known.get(key).or_else(|| self.pending.get(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillEstimate {
    pub price: f64,
    pub quantity: f64,
    pub realized_pnl: Option<f64>,
    pub source: FillSource,
}

fn is_closing_trade(trade: &AccountTrade, position: &Position) -> bool {
    trade.symbol == position.symbol
        && trade.side == position.side.closing_trade_side()
        && trade.position_side.map_or(true, |s| s == position.side)
}

/// Recover the close fill for `position`, which vanished around `closed_at`.
///
/// Falls back from matched trade history, to a quantity reverse-engineered
/// from realized P&L, to the last snapshot valued at `market_price`.
pub fn estimate_fill(
    position: &Position,
    trades: &[AccountTrade],
    closed_at: TimeMs,
    market_price: f64,
) -> FillEstimate {
    let closing: Vec<&AccountTrade> = trades
        .iter()
        .filter(|t| is_closing_trade(t, position))
        .collect();

    let in_window: Vec<&&AccountTrade> = closing
        .iter()
        .filter(|t| (t.time.as_i64() - closed_at.as_i64()).abs() <= FILL_MATCH_WINDOW_MS)
        .collect();
    let quantity: f64 = in_window.iter().map(|t| t.quantity).sum();
    if quantity > 0.0 {
        let notional: f64 = in_window.iter().map(|t| t.price * t.quantity).sum();
        let realized: f64 = in_window.iter().map(|t| t.realized_pnl).sum();
        return FillEstimate {
            price: notional / quantity,
            quantity,
            realized_pnl: Some(realized),
            source: FillSource::TradeHistory,
        };
    }

    let latest_with_pnl = closing
        .iter()
        .filter(|t| t.realized_pnl != 0.0)
        .max_by_key(|t| t.time);
    if let Some(trade) = latest_with_pnl {
        let delta = trade.price - position.entry_price;
        if delta != 0.0 {
            return FillEstimate {
                price: trade.price,
                quantity: (trade.realized_pnl / delta).abs(),
                realized_pnl: Some(trade.realized_pnl),
                source: FillSource::RealizedPnl,
            };
        }
    }

    FillEstimate {
        price: market_price,
        quantity: position.quantity,
        realized_pnl: None,
        source: FillSource::Snapshot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PositionSide, TradeSide};

    fn position(symbol: &str, side: PositionSide) -> Position {
        Position {
            symbol: symbol.to_string(),
            side,
            entry_price: 100.0,
            mark_price: 100.0,
            quantity: 2.0,
            leverage: 5,
            liquidation_price: 0.0,
            unrealized_pnl: 0.0,
            margin_used: 0.0,
            opened_at: None,
        }
    }

    fn trade(side: TradeSide, price: f64, qty: f64, pnl: f64, time: i64) -> AccountTrade {
        AccountTrade {
            symbol: "BTCUSDT".to_string(),
            side,
            position_side: None,
            price,
            quantity: qty,
            realized_pnl: pnl,
            time: TimeMs::new(time),
        }
    }

    const SETTLE_MS: i64 = 10 * 60_000;

    fn book_with(positions: &[Position]) -> PositionBook {
        let mut book = PositionBook::default();
        for p in positions {
            book.last_known.insert(p.key(), p.clone());
            book.first_seen.insert(p.key(), TimeMs::new(1));
        }
        book
    }

    #[test]
    fn diff_detects_new_and_vanished_positions() {
        let btc = position("BTCUSDT", PositionSide::Long);
        let eth = position("ETHUSDT", PositionSide::Short);
        let book = book_with(&[btc.clone()]);

        let d = book.diff(&[eth.clone()], TimeMs::new(0), SETTLE_MS);
        assert_eq!(d.newly_seen, vec![eth.key()]);
        assert_eq!(d.disappeared, vec![btc]);
    }

    #[test]
    fn diff_unchanged_set_is_empty() {
        let btc = position("BTCUSDT", PositionSide::Long);
        let book = book_with(&[btc.clone()]);
        assert_eq!(
            book.diff(&[btc], TimeMs::new(0), SETTLE_MS),
            ReconcileDiff::default()
        );
    }

    #[test]
    fn diff_same_symbol_other_side_is_distinct() {
        let long = position("BTCUSDT", PositionSide::Long);
        let short = position("BTCUSDT", PositionSide::Short);
        let book = book_with(&[long.clone()]);
        let d = book.diff(&[short.clone()], TimeMs::new(0), SETTLE_MS);
        assert_eq!(d.newly_seen, vec![short.key()]);
        assert_eq!(d.disappeared, vec![long]);
    }

    #[test]
    fn closed_position_still_reported_is_not_adopted() {
        let btc = position("BTCUSDT", PositionSide::Long);
        let mut book = book_with(&[btc.clone()]);
        book.close(&btc.key(), TimeMs::new(0));

        let d = book.diff(&[btc.clone()], TimeMs::new(60_000), SETTLE_MS);
        assert_eq!(d.stale, vec![btc.key()]);
        assert!(d.newly_seen.is_empty());
        assert!(d.disappeared.is_empty());

        book.apply(&[btc.clone()], &d, Vec::new());
        assert!(book.last_known.is_empty());
        assert!(book.first_seen.is_empty());

        // the exchange catches up: nothing left to record
        let d = book.diff(&[], TimeMs::new(120_000), SETTLE_MS);
        assert_eq!(d, ReconcileDiff::default());
        book.apply(&[], &d, Vec::new());
        assert!(book.recently_closed.is_empty());
    }

    #[test]
    fn closed_position_reported_past_the_window_is_adopted() {
        let btc = position("BTCUSDT", PositionSide::Long);
        let mut book = book_with(&[btc.clone()]);
        book.close(&btc.key(), TimeMs::new(0));

        let d = book.diff(&[btc.clone()], TimeMs::new(SETTLE_MS), SETTLE_MS);
        assert!(d.stale.is_empty());
        assert_eq!(d.newly_seen, vec![btc.key()]);
        book.apply(&[btc.clone()], &d, Vec::new());
        assert!(book.last_known.contains_key(&btc.key()));
        assert!(book.recently_closed.is_empty());
    }

    #[test]
    fn pending_open_waits_for_the_exchange() {
        let eth = position("ETHUSDT", PositionSide::Short);
        let mut book = PositionBook::default();
        book.open(eth.clone(), TimeMs::new(0));
        assert_eq!(book.open_keys(), vec![eth.key()]);

        // not reported yet: neither closed nor confirmed
        let d = book.diff(&[], TimeMs::new(60_000), SETTLE_MS);
        assert_eq!(d, ReconcileDiff::default());
        book.apply(&[], &d, Vec::new());
        assert!(book.pending.contains_key(&eth.key()));

        let d = book.diff(&[eth.clone()], TimeMs::new(120_000), SETTLE_MS);
        assert_eq!(d.confirmed, vec![eth.key()]);
        assert!(d.newly_seen.is_empty());
        book.apply(&[eth.clone()], &d, Vec::new());
        assert!(book.pending.is_empty());
        assert!(book.last_known.contains_key(&eth.key()));
        assert_eq!(book.first_seen.get(&eth.key()), Some(&TimeMs::new(0)));
    }

    #[test]
    fn pending_open_never_reported_closes_after_the_window() {
        let eth = position("ETHUSDT", PositionSide::Short);
        let mut book = PositionBook::default();
        book.open(eth.clone(), TimeMs::new(0));

        let d = book.diff(&[], TimeMs::new(SETTLE_MS), SETTLE_MS);
        assert_eq!(d.disappeared.len(), 1);
        assert_eq!(d.disappeared[0].key(), eth.key());
        assert_eq!(d.disappeared[0].opened_at, Some(TimeMs::new(0)));

        // a failed write keeps it tracked for the next pass
        book.apply(&[], &d, d.disappeared.clone());
        assert!(book.pending.is_empty());
        assert!(book.last_known.contains_key(&eth.key()));
    }

    #[test]
    fn reopen_clears_close_memory() {
        let btc = position("BTCUSDT", PositionSide::Long);
        let mut book = book_with(&[btc.clone()]);
        book.close(&btc.key(), TimeMs::new(0));
        book.open(btc.clone(), TimeMs::new(30_000));

        let d = book.diff(&[btc.clone()], TimeMs::new(60_000), SETTLE_MS);
        assert!(d.stale.is_empty());
        assert_eq!(d.confirmed, vec![btc.key()]);
    }

    #[test]
    fn estimate_uses_trades_inside_window() {
        let p = position("BTCUSDT", PositionSide::Long);
        let now = 10 * 60_000;
        let trades = vec![
            trade(TradeSide::Sell, 110.0, 1.0, 10.0, now - 60_000),
            trade(TradeSide::Sell, 120.0, 1.0, 20.0, now - 120_000),
            // outside the window
            trade(TradeSide::Sell, 90.0, 5.0, -50.0, now - 6 * 60_000),
            // opening side, ignored
            trade(TradeSide::Buy, 100.0, 2.0, 0.0, now - 30_000),
        ];
        let fill = estimate_fill(&p, &trades, TimeMs::new(now), 130.0);
        assert_eq!(fill.source, FillSource::TradeHistory);
        assert_eq!(fill.quantity, 2.0);
        assert_eq!(fill.price, 115.0);
        assert_eq!(fill.realized_pnl, Some(30.0));
    }

    #[test]
    fn estimate_reverse_engineers_quantity_from_pnl() {
        let p = position("BTCUSDT", PositionSide::Long);
        let trades = vec![trade(TradeSide::Sell, 95.0, 0.0, -7.5, 0)];
        let fill = estimate_fill(&p, &trades, TimeMs::new(60 * 60_000), 130.0);
        assert_eq!(fill.source, FillSource::RealizedPnl);
        assert_eq!(fill.price, 95.0);
        assert_eq!(fill.quantity, 1.5);
        assert_eq!(fill.realized_pnl, Some(-7.5));
    }

    #[test]
    fn estimate_falls_back_to_snapshot() {
        let p = position("BTCUSDT", PositionSide::Short);
        // a sell never closes a short
        let trades = vec![trade(TradeSide::Sell, 95.0, 1.0, 5.0, 0)];
        let fill = estimate_fill(&p, &trades, TimeMs::new(0), 98.0);
        assert_eq!(fill.source, FillSource::Snapshot);
        assert_eq!(fill.price, 98.0);
        assert_eq!(fill.quantity, 2.0);
        assert_eq!(fill.realized_pnl, None);
    }

    #[test]
    fn estimate_respects_hedge_mode_position_side() {
        let p = position("BTCUSDT", PositionSide::Long);
        let mut t = trade(TradeSide::Sell, 110.0, 2.0, 20.0, 0);
        t.position_side = Some(PositionSide::Short);
        let fill = estimate_fill(&p, &[t], TimeMs::new(0), 105.0);
        assert_eq!(fill.source, FillSource::Snapshot);
    }
}
