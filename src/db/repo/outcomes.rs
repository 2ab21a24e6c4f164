//! Trade outcome operations for the repository.

use crate::domain::{TimeMs, TradeOutcome};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_column, Repository, StoreError};

impl Repository {
    /// Insert a trade outcome idempotently.
    ///
    /// Returns `false` when an outcome with the same key already exists, so a
    /// position lifecycle is recorded at most once.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn save_trade_outcome(&self, outcome: &TradeOutcome) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trade_outcomes (
                outcome_key, symbol, side, quantity, leverage, open_price, close_price,
                position_value, margin_used, pnl, pnl_pct, duration_minutes,
                open_time_ms, close_time_ms, was_stop_loss, entry_reason, exit_reason,
                is_premature, failure_type, close_trigger, fill_source, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(outcome_key) DO NOTHING
            "#,
        )
        .bind(outcome.outcome_key.as_str())
        .bind(outcome.symbol.as_str())
        .bind(outcome.side.as_str())
        .bind(outcome.quantity)
        .bind(outcome.leverage as i64)
        .bind(outcome.open_price)
        .bind(outcome.close_price)
        .bind(outcome.position_value)
        .bind(outcome.margin_used)
        .bind(outcome.pnl)
        .bind(outcome.pnl_pct)
        .bind(outcome.duration_minutes)
        .bind(outcome.open_time.as_i64())
        .bind(outcome.close_time.as_i64())
        .bind(outcome.was_stop_loss)
        .bind(outcome.entry_reason.as_str())
        .bind(outcome.exit_reason.as_str())
        .bind(outcome.is_premature)
        .bind(outcome.failure_type.map(|f| f.as_str()))
        .bind(outcome.close_trigger.as_str())
        .bind(outcome.fill_source.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recent outcomes by close time, newest first.
    pub async fn get_recent_trade_outcomes(
        &self,
        limit: usize,
    ) -> Result<Vec<TradeOutcome>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT outcome_key, symbol, side, quantity, leverage, open_price, close_price,
                   position_value, margin_used, pnl, pnl_pct, duration_minutes,
                   open_time_ms, close_time_ms, was_stop_loss, entry_reason, exit_reason,
                   is_premature, failure_type, close_trigger, fill_source
            FROM trade_outcomes
            ORDER BY close_time_ms DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outcome_from_row).collect()
    }

    /// Outcomes closed at or after `since`, newest first.
    pub async fn get_trade_outcomes_since(
        &self,
        since: TimeMs,
    ) -> Result<Vec<TradeOutcome>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT outcome_key, symbol, side, quantity, leverage, open_price, close_price,
                   position_value, margin_used, pnl, pnl_pct, duration_minutes,
                   open_time_ms, close_time_ms, was_stop_loss, entry_reason, exit_reason,
                   is_premature, failure_type, close_trigger, fill_source
            FROM trade_outcomes
            WHERE close_time_ms >= ?
            ORDER BY close_time_ms DESC, id DESC
            "#,
        )
        .bind(since.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outcome_from_row).collect()
    }

    pub async fn count_trade_outcomes(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trade_outcomes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }
}

fn outcome_from_row(row: &SqliteRow) -> Result<TradeOutcome, StoreError> {
    let side: String = row.get("side");
    let failure_type: Option<String> = row.get("failure_type");
    let close_trigger: String = row.get("close_trigger");
    let fill_source: String = row.get("fill_source");

    Ok(TradeOutcome {
        outcome_key: row.get("outcome_key"),
        symbol: row.get("symbol"),
        side: parse_column(&side, "side")?,
        quantity: row.get("quantity"),
        leverage: row.get::<i64, _>("leverage").max(1) as u32,
        open_price: row.get("open_price"),
        close_price: row.get("close_price"),
        position_value: row.get("position_value"),
        margin_used: row.get("margin_used"),
        pnl: row.get("pnl"),
        pnl_pct: row.get("pnl_pct"),
        duration_minutes: row.get("duration_minutes"),
        open_time: TimeMs::new(row.get("open_time_ms")),
        close_time: TimeMs::new(row.get("close_time_ms")),
        was_stop_loss: row.get("was_stop_loss"),
        entry_reason: row.get("entry_reason"),
        exit_reason: row.get("exit_reason"),
        is_premature: row.get("is_premature"),
        failure_type: failure_type
            .as_deref()
            .map(|f| parse_column(f, "failure_type"))
            .transpose()?,
        close_trigger: parse_column(&close_trigger, "close_trigger")?,
        fill_source: parse_column(&fill_source, "fill_source")?,
    })
}
