//! Decision cycle record operations for the repository.

use crate::domain::{DecisionCycleRecord, TimeMs};
use sqlx::Row;

use super::{Repository, StoreError};

impl Repository {
    /// Append a cycle record. Records are never updated afterwards.
    ///
    /// # Errors
    /// Returns an error if serialization or the insert fails.
    pub async fn save_cycle_record(&self, record: &DecisionCycleRecord) -> Result<i64, StoreError> {
        let account_json = record
            .account
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = sqlx::query(
            r#"
            INSERT INTO cycle_records (
                cycle_number, timestamp_ms, success, error_message, total_equity,
                account_json, positions_json, candidates_json, decisions_json,
                executions_json, prompt, cot_trace, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.cycle_number as i64)
        .bind(record.timestamp.as_i64())
        .bind(record.success)
        .bind(record.error_message.as_deref())
        .bind(record.total_equity())
        .bind(account_json)
        .bind(serde_json::to_string(&record.positions)?)
        .bind(serde_json::to_string(&record.candidate_symbols)?)
        .bind(serde_json::to_string(&record.decisions)?)
        .bind(serde_json::to_string(&record.executions)?)
        .bind(record.prompt.as_deref())
        .bind(record.cot_trace.as_deref())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent cycle records, oldest first.
    pub async fn get_recent_cycle_records(
        &self,
        limit: usize,
    ) -> Result<Vec<DecisionCycleRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT cycle_number, timestamp_ms, success, error_message, account_json,
                   positions_json, candidates_json, decisions_json, executions_json,
                   prompt, cot_trace
            FROM cycle_records
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = rows
            .iter()
            .map(|row| -> Result<DecisionCycleRecord, StoreError> {
                let account_json: Option<String> = row.get("account_json");
                let positions_json: String = row.get("positions_json");
                let candidates_json: String = row.get("candidates_json");
                let decisions_json: String = row.get("decisions_json");
                let executions_json: String = row.get("executions_json");
                Ok(DecisionCycleRecord {
                    cycle_number: row.get::<i64, _>("cycle_number") as u64,
                    timestamp: TimeMs::new(row.get("timestamp_ms")),
                    account: account_json
                        .as_deref()
                        .map(serde_json::from_str)
                        .transpose()?,
                    positions: serde_json::from_str(&positions_json)?,
                    candidate_symbols: serde_json::from_str(&candidates_json)?,
                    prompt: row.get("prompt"),
                    cot_trace: row.get("cot_trace"),
                    decisions: serde_json::from_str(&decisions_json)?,
                    executions: serde_json::from_str(&executions_json)?,
                    success: row.get("success"),
                    error_message: row.get("error_message"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    /// Largest persisted cycle number, 0 when no cycle ran yet.
    pub async fn get_latest_cycle_number(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT MAX(cycle_number) AS max_cycle FROM cycle_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<Option<i64>, _>("max_cycle").unwrap_or(0).max(0) as u64)
    }

    /// Start time of the window spanned by the last `cycles` cycle records,
    /// or `None` before the first cycle.
    pub async fn get_cycle_window_start(&self, cycles: usize) -> Result<Option<TimeMs>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT MIN(timestamp_ms) AS window_start FROM (
                SELECT timestamp_ms FROM cycle_records
                ORDER BY id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(cycles as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<Option<i64>, _>("window_start").map(TimeMs::new))
    }

    /// Total equity of the most recent cycles that captured an account
    /// snapshot, oldest first.
    pub async fn get_recent_equity(&self, limit: usize) -> Result<Vec<f64>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT total_equity FROM cycle_records
            WHERE total_equity IS NOT NULL
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut equity: Vec<f64> = rows.iter().map(|row| row.get("total_equity")).collect();
        equity.reverse();
        Ok(equity)
    }
}
