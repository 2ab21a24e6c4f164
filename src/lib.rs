pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod orchestration;
pub mod provider;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{Action, Decision, Position, PositionKey, PositionSide, TimeMs, TradeOutcome};
pub use error::AppError;
pub use exchange::{Exchange, ExchangeError, GatewayExchange, MockExchange};
pub use orchestration::{Orchestrator, TickOutcome, TraderStatus};
pub use provider::{DecisionProvider, HttpDecisionProvider, MockDecisionProvider};

use std::sync::Arc;

/// Wire the production collaborators from `config`.
pub async fn build_orchestrator(config: Config) -> Result<Orchestrator, AppError> {
    let pool = init_db(&config.database_path).await?;
    let repo = Arc::new(Repository::new(pool));
    let exchange: Arc<dyn Exchange> =
        Arc::new(GatewayExchange::new(config.exchange_gateway_url.clone()));
    let provider: Arc<dyn DecisionProvider> =
        Arc::new(HttpDecisionProvider::new(config.decision_provider_url.clone()));
    let orchestrator = Orchestrator::new(config, exchange, provider, repo).await?;
    Ok(orchestrator)
}
