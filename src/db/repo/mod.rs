//! Repository layer for database operations.
//!
//! Methods are organized across submodules by table:
//! - `cycles.rs` - decision cycle records and the equity series
//! - `outcomes.rs` - trade outcomes, idempotent by outcome key
//! - `positions.rs` - position open times and entry reasons
//! - `runtime.rs` - persisted pause flag
//! - `learning.rs` - learning summaries

mod cycles;
mod learning;
mod outcomes;
mod positions;
mod runtime;

pub use positions::OpenTimeRecord;
pub use runtime::PersistedRuntimeState;

use sqlx::sqlite::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Durable store. Clones share the underlying pool.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_column<T: std::str::FromStr>(value: &str, column: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid {} value: {}", column, value)))
}
