use anyhow::Context;
use perpcycle::{build_orchestrator, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(
        symbols = ?config.candidate_symbols,
        interval_minutes = config.scan_interval_minutes,
        "Starting trader"
    );

    let orchestrator = build_orchestrator(config)
        .await
        .context("initializing orchestrator")?;
    let scheduler = orchestrator
        .start()
        .await
        .context("scheduler already running")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown requested");

    orchestrator.stop().await;
    scheduler.await.context("scheduler task panicked")?;
    Ok(())
}
