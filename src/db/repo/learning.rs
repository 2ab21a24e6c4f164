//! Learning summary operations for the repository.

use crate::domain::{LearningSummary, TimeMs};
use sqlx::Row;

use super::{Repository, StoreError};

impl Repository {
    pub async fn get_active_learning_summary(&self) -> Result<Option<LearningSummary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, summary, trades_analyzed, created_at_ms, is_active
            FROM learning_summaries
            WHERE is_active = 1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| LearningSummary {
            id: row.get("id"),
            summary: row.get("summary"),
            trades_analyzed: row.get::<i64, _>("trades_analyzed").max(0) as usize,
            created_at: TimeMs::new(row.get("created_at_ms")),
            is_active: row.get("is_active"),
        }))
    }

    /// Deactivate every previous summary and insert the new active one, in a
    /// single transaction.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; nothing is changed then.
    pub async fn save_learning_summary(
        &self,
        summary: &str,
        trades_analyzed: usize,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE learning_summaries SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO learning_summaries (summary, trades_analyzed, created_at_ms, is_active)
            VALUES (?, ?, ?, 1)
            "#,
        )
        .bind(summary)
        .bind(trades_analyzed as i64)
        .bind(TimeMs::now().as_i64())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;

    #[tokio::test]
    async fn test_only_latest_summary_is_active() {
        let (repo, _temp) = setup_test_db().await;
        assert!(repo.get_active_learning_summary().await.unwrap().is_none());

        repo.save_learning_summary("cut losers faster", 10).await.unwrap();
        let second = repo.save_learning_summary("avoid chop", 20).await.unwrap();

        let active = repo.get_active_learning_summary().await.unwrap().unwrap();
        assert_eq!(active.id, second);
        assert_eq!(active.summary, "avoid chop");
        assert_eq!(active.trades_analyzed, 20);
        assert!(active.is_active);

        let (active_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM learning_summaries WHERE is_active = 1")
                .fetch_one(repo.pool())
                .await
                .unwrap();
        assert_eq!(active_count, 1);
    }
}
