//! SQLite persistence: the single-writer pool and the `Repository` the
//! orchestrator records cycles, outcomes, open times and runtime flags through.

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{OpenTimeRecord, PersistedRuntimeState, Repository, StoreError};
