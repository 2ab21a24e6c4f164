//! Position open-time operations for the repository.

use crate::domain::{PositionKey, PositionSide, TimeMs};
use sqlx::Row;

use super::{parse_column, Repository, StoreError};

/// When a position was first seen, and why it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTimeRecord {
    pub key: PositionKey,
    pub opened_at: TimeMs,
    pub entry_reason: String,
}

impl Repository {
    /// Record (or overwrite) the open time for a position key.
    pub async fn save_position_open_time(
        &self,
        key: &PositionKey,
        opened_at: TimeMs,
        entry_reason: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO position_open_times (position_key, symbol, side, opened_at_ms, entry_reason)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(position_key) DO UPDATE SET
                opened_at_ms = excluded.opened_at_ms,
                entry_reason = excluded.entry_reason
            "#,
        )
        .bind(key.storage_key())
        .bind(key.symbol.as_str())
        .bind(key.side.as_str())
        .bind(opened_at.as_i64())
        .bind(entry_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_position_open_time(
        &self,
        key: &PositionKey,
    ) -> Result<Option<OpenTimeRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT opened_at_ms, entry_reason FROM position_open_times
            WHERE position_key = ?
            "#,
        )
        .bind(key.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| OpenTimeRecord {
            key: key.clone(),
            opened_at: TimeMs::new(row.get("opened_at_ms")),
            entry_reason: row.get("entry_reason"),
        }))
    }

    /// Every tracked open time, used to restore first-seen state on startup.
    pub async fn get_all_position_open_times(&self) -> Result<Vec<OpenTimeRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, side, opened_at_ms, entry_reason FROM position_open_times
            ORDER BY position_key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<OpenTimeRecord, StoreError> {
                let side: String = row.get("side");
                let side: PositionSide = parse_column(&side, "side")?;
                Ok(OpenTimeRecord {
                    key: PositionKey::new(row.get::<String, _>("symbol"), side),
                    opened_at: TimeMs::new(row.get("opened_at_ms")),
                    entry_reason: row.get("entry_reason"),
                })
            })
            .collect()
    }

    /// Returns `true` when a row was removed.
    pub async fn delete_position_open_time(&self, key: &PositionKey) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM position_open_times WHERE position_key = ?")
            .bind(key.storage_key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use crate::domain::{PositionKey, PositionSide, TimeMs};

    #[tokio::test]
    async fn test_open_time_lifecycle() {
        let (repo, _temp) = setup_test_db().await;
        let key = PositionKey::new("ETHUSDT", PositionSide::Short);

        assert!(repo.get_position_open_time(&key).await.unwrap().is_none());
        repo.save_position_open_time(&key, TimeMs::new(5000), "lower highs")
            .await
            .unwrap();

        let record = repo.get_position_open_time(&key).await.unwrap().unwrap();
        assert_eq!(record.opened_at, TimeMs::new(5000));
        assert_eq!(record.entry_reason, "lower highs");

        assert!(repo.delete_position_open_time(&key).await.unwrap());
        assert!(!repo.delete_position_open_time(&key).await.unwrap());
        assert!(repo.get_position_open_time(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sides_are_tracked_separately() {
        let (repo, _temp) = setup_test_db().await;
        let long = PositionKey::new("BTCUSDT", PositionSide::Long);
        let short = PositionKey::new("BTCUSDT", PositionSide::Short);
        repo.save_position_open_time(&long, TimeMs::new(1), "a").await.unwrap();
        repo.save_position_open_time(&short, TimeMs::new(2), "b").await.unwrap();

        let all = repo.get_all_position_open_times().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key, long);
        assert_eq!(all[1].key, short);
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_key() {
        let (repo, _temp) = setup_test_db().await;
        let key = PositionKey::new("BTCUSDT", PositionSide::Long);
        repo.save_position_open_time(&key, TimeMs::new(1), "first").await.unwrap();
        repo.save_position_open_time(&key, TimeMs::new(2), "second").await.unwrap();
        let record = repo.get_position_open_time(&key).await.unwrap().unwrap();
        assert_eq!(record.opened_at, TimeMs::new(2));
        assert_eq!(record.entry_reason, "second");
    }
}
