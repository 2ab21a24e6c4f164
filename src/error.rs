use crate::config::ConfigError;
use crate::db::StoreError;
use crate::orchestration::OrchestrationError;
use thiserror::Error;

/// Startup and wiring failures surfaced to the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),
}
