//! Persisted runtime state (the pause flag) for the repository.

use crate::domain::TimeMs;
use sqlx::Row;

use super::{Repository, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedRuntimeState {
    pub is_paused: bool,
    pub updated_at: TimeMs,
}

impl Repository {
    pub async fn save_runtime_state(&self, is_paused: bool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO runtime_state (id, is_paused, updated_at_ms) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                is_paused = excluded.is_paused,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(is_paused)
        .bind(TimeMs::now().as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `None` when the agent never persisted a state.
    pub async fn get_runtime_state(&self) -> Result<Option<PersistedRuntimeState>, StoreError> {
        let row = sqlx::query("SELECT is_paused, updated_at_ms FROM runtime_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| PersistedRuntimeState {
            is_paused: row.get("is_paused"),
            updated_at: TimeMs::new(row.get("updated_at_ms")),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;

    #[tokio::test]
    async fn test_runtime_state_round_trip() {
        let (repo, _temp) = setup_test_db().await;
        assert!(repo.get_runtime_state().await.unwrap().is_none());

        repo.save_runtime_state(true).await.unwrap();
        assert!(repo.get_runtime_state().await.unwrap().unwrap().is_paused);

        repo.save_runtime_state(false).await.unwrap();
        assert!(!repo.get_runtime_state().await.unwrap().unwrap().is_paused);
    }
}
