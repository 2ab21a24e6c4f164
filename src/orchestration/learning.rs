//! Background learning pass: distill recent outcomes into an active summary.

use crate::db::{Repository, StoreError};
use crate::engine::analyze;
use crate::provider::{DecisionProvider, LearningRequest, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("learning summary call timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcomes handed to the provider per pass.
pub const LEARNING_OUTCOME_LIMIT: usize = 50;

/// Run one pass. Returns the stored summary id, or `None` when there is
/// nothing to learn from yet.
///
/// Only touches the outcome and summary tables; never the in-memory runtime
/// state.
pub async fn run_learning_pass(
    repo: &Repository,
    provider: &dyn DecisionProvider,
    call_timeout: Duration,
) -> Result<Option<i64>, LearningError> {
    let outcomes = repo.get_recent_trade_outcomes(LEARNING_OUTCOME_LIMIT).await?;
    if outcomes.is_empty() {
        tracing::debug!("No trade outcomes yet, skipping learning pass");
        return Ok(None);
    }

    let performance = analyze(&outcomes, &[]);
    let request = LearningRequest {
        outcomes,
        performance,
    };
    let summary = tokio::time::timeout(call_timeout, provider.summarize(&request))
        .await
        .map_err(|_| LearningError::Timeout(call_timeout))??;

    let id = repo
        .save_learning_summary(&summary, request.outcomes.len())
        .await?;
    tracing::info!(
        summary_id = id,
        trades = request.outcomes.len(),
        "Saved learning summary"
    );
    Ok(Some(id))
}

/// Fire-and-forget wrapper around [`run_learning_pass`]; errors are logged.
pub fn spawn_learning_pass(
    repo: Arc<Repository>,
    provider: Arc<dyn DecisionProvider>,
    call_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_learning_pass(&repo, provider.as_ref(), call_timeout).await {
            tracing::warn!(error = %e, "Learning pass failed");
        }
    })
}
