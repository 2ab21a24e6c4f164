use perpcycle::config::Config;
use perpcycle::db::init_db;
use perpcycle::domain::{
    Action, Balance, CloseTrigger, Decision, DecisionCycleRecord, FillSource, PositionSide,
    TimeMs,
};
use perpcycle::exchange::mock::{test_klines, test_position};
use perpcycle::orchestration::{ExecutionError, OrchestrationError};
use perpcycle::{MockDecisionProvider, MockExchange, Orchestrator, Repository, TickOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    orchestrator: Orchestrator,
    exchange: MockExchange,
    provider: MockDecisionProvider,
    repo: Arc<Repository>,
    config: Config,
    _temp: TempDir,
}

fn test_config(db_path: &str, overrides: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = [
        ("DATABASE_PATH", db_path),
        ("EXCHANGE_GATEWAY_URL", "http://example.invalid"),
        ("DECISION_PROVIDER_URL", "http://example.invalid"),
        ("INITIAL_BALANCE", "1000"),
        ("CANDIDATE_SYMBOLS", "BTCUSDT"),
        ("ORDER_SPACING_MS", "0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (key, value) in overrides {
        env.insert(key.to_string(), value.to_string());
    }
    Config::from_env_map(env).expect("valid test config")
}

fn funded_exchange(wallet: f64) -> MockExchange {
    MockExchange::new()
        .with_balance(Balance {
            wallet_balance: wallet,
            unrealized_profit: 0.0,
            available_balance: wallet,
        })
        .with_price("BTCUSDT", 50_000.0)
        .with_klines("BTCUSDT", test_klines(50_000.0, 60))
}

async fn setup_with(
    exchange: MockExchange,
    provider: MockDecisionProvider,
    overrides: &[(&str, &str)],
) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let config = test_config(&db_path, overrides);

    let orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(exchange.clone()),
        Arc::new(provider.clone()),
        repo.clone(),
    )
    .await
    .expect("orchestrator");

    Harness {
        orchestrator,
        exchange,
        provider,
        repo,
        config,
        _temp: temp_dir,
    }
}

async fn setup(exchange: MockExchange, provider: MockDecisionProvider) -> Harness {
    setup_with(exchange, provider, &[]).await
}

fn completed(outcome: TickOutcome) -> DecisionCycleRecord {
    match outcome {
        TickOutcome::Completed(record) => *record,
        other => panic!("expected a completed cycle, got {:?}", other),
    }
}

#[tokio::test]
async fn test_paused_ticks_make_no_external_calls() {
    let h = setup(funded_exchange(1000.0), MockDecisionProvider::new()).await;
    h.orchestrator.pause().await.unwrap();

    for _ in 0..5 {
        assert_eq!(h.orchestrator.tick().await, TickOutcome::Paused);
    }

    assert!(h.exchange.calls().is_empty());
    assert_eq!(h.provider.decide_count(), 0);
    let status = h.orchestrator.get_status().await;
    assert!(status.is_paused);
    assert_eq!(status.cycle_number, 0);
    assert_eq!(status.call_count, 0);
    assert_eq!(h.repo.get_latest_cycle_number().await.unwrap(), 0);

    h.orchestrator.resume().await.unwrap();
    completed(h.orchestrator.tick().await);
    assert_eq!(h.provider.decide_count(), 1);
}

#[tokio::test]
async fn test_cooldown_skips_provider_and_orders() {
    let mut open = Decision::new("BTCUSDT", Action::OpenLong);
    open.position_size_usd = 100.0;
    let provider = MockDecisionProvider::new().with_decisions(vec![open]);
    let h = setup(funded_exchange(1000.0), provider).await;

    let until = TimeMs::now().plus_minutes(5);
    h.orchestrator.set_stop_until(until).await;

    let record = completed(h.orchestrator.tick().await);
    assert!(!record.success);
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("risk control"));
    assert_eq!(h.provider.decide_count(), 0);
    assert!(h.exchange.order_calls().is_empty());

    let stored = h.repo.get_recent_cycle_records(5).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].success);
    assert_eq!(h.orchestrator.get_status().await.stop_until, Some(until));
}

#[tokio::test]
async fn test_drawdown_breach_trips_cooldown() {
    // 30% below the initial balance; default drawdown limit is 20%
    let h = setup(funded_exchange(700.0), MockDecisionProvider::new()).await;

    let record = completed(h.orchestrator.tick().await);
    assert!(!record.success);
    let message = record.error_message.unwrap();
    assert!(message.starts_with("risk control: drawdown"), "{}", message);
    assert_eq!(h.provider.decide_count(), 0);

    let status = h.orchestrator.get_status().await;
    let until = status.stop_until.expect("cooldown set");
    assert!(until > TimeMs::now().plus_minutes(59));

    h.exchange.clear_calls();
    let record = completed(h.orchestrator.tick().await);
    assert!(!record.success);
    assert!(h.exchange.calls().is_empty());
    assert_eq!(h.provider.decide_count(), 0);
}

#[tokio::test]
async fn test_paused_state_survives_restart() {
    let h = setup(funded_exchange(1000.0), MockDecisionProvider::new()).await;
    completed(h.orchestrator.tick().await);
    h.orchestrator.pause().await.unwrap();

    let restarted = Orchestrator::new(
        h.config.clone(),
        Arc::new(h.exchange.clone()),
        Arc::new(MockDecisionProvider::new()),
        h.repo.clone(),
    )
    .await
    .unwrap();

    assert!(restarted.is_paused().await);
    assert_eq!(restarted.get_status().await.cycle_number, 1);
    assert_eq!(restarted.tick().await, TickOutcome::Paused);

    restarted.resume().await.unwrap();
    let record = completed(restarted.tick().await);
    assert_eq!(record.cycle_number, 2);
}

#[tokio::test]
async fn test_manual_close_and_reconcile_record_one_outcome() {
    let exchange = funded_exchange(1000.0).with_position(test_position(
        "BTCUSDT",
        PositionSide::Long,
        48_000.0,
        0.01,
    ));
    let h = setup(exchange, MockDecisionProvider::new()).await;

    completed(h.orchestrator.tick().await);
    assert_eq!(h.orchestrator.get_positions().await.len(), 1);

    let outcome = h
        .orchestrator
        .close_position("BTCUSDT", PositionSide::Long)
        .await
        .unwrap()
        .expect("outcome recorded");
    assert_eq!(outcome.close_trigger, CloseTrigger::Manual);
    assert_eq!(outcome.exit_reason, "manual close");
    assert!((outcome.pnl - 20.0).abs() < 1e-6);

    // the next cycle sees the position gone, but it was already recorded
    completed(h.orchestrator.tick().await);
    assert_eq!(h.repo.count_trade_outcomes().await.unwrap(), 1);
    assert!(h.orchestrator.get_positions().await.is_empty());
    assert!((h.orchestrator.get_status().await.daily_pnl - 20.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_manual_close_rejected_while_paused_or_missing() {
    let h = setup(funded_exchange(1000.0), MockDecisionProvider::new()).await;

    let err = h
        .orchestrator
        .close_position("BTCUSDT", PositionSide::Long)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Execution(ExecutionError::NoPosition(_))
    ));

    h.orchestrator.pause().await.unwrap();
    let err = h
        .orchestrator
        .close_position("BTCUSDT", PositionSide::Long)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Execution(ExecutionError::Paused)
    ));
    assert!(h.exchange.order_calls().is_empty());
}

#[tokio::test]
async fn test_overlapping_tick_is_skipped() {
    let exchange = funded_exchange(1000.0).with_read_delay(Duration::from_millis(300));
    let h = setup(exchange, MockDecisionProvider::new()).await;

    let first = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.tick().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.orchestrator.tick().await, TickOutcome::Overlapping);

    let record = completed(first.await.unwrap());
    assert!(record.success);
    assert_eq!(h.provider.decide_count(), 1);
}

#[tokio::test]
async fn test_learning_pass_runs_on_interval() {
    let exchange = funded_exchange(1000.0).with_position(test_position(
        "BTCUSDT",
        PositionSide::Long,
        49_000.0,
        0.01,
    ));
    let provider = MockDecisionProvider::new().with_summary("trail stops sooner");
    let h = setup_with(
        exchange,
        provider,
        &[("AI_LEARNING_ENABLED", "true"), ("AI_LEARNING_INTERVAL", "2")],
    )
    .await;

    // cycle 1: position observed
    completed(h.orchestrator.tick().await);
    // cycle 2: position gone, outcome recorded, learning pass due
    h.exchange.set_positions(Vec::new());
    completed(h.orchestrator.tick().await);

    let mut summary = None;
    for _ in 0..50 {
        summary = h.repo.get_active_learning_summary().await.unwrap();
        if summary.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let summary = summary.expect("learning summary saved");
    assert_eq!(summary.summary, "trail stops sooner");
    assert_eq!(summary.trades_analyzed, 1);
    assert_eq!(h.provider.summarize_count(), 1);
}

#[tokio::test]
async fn test_scheduler_start_and_stop() {
    let h = setup_with(
        funded_exchange(1000.0),
        MockDecisionProvider::new(),
        &[("SCAN_INTERVAL_MINUTES", "60")],
    )
    .await;

    let handle = h.orchestrator.start().await.expect("first start");
    assert!(h.orchestrator.get_status().await.is_running);
    assert!(h.orchestrator.start().await.is_none());

    // the first interval tick fires immediately
    let mut ran = false;
    for _ in 0..50 {
        if h.provider.decide_count() > 0 {
            ran = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ran);
    // a second start did not spawn a second loop
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.provider.decide_count(), 1);

    h.orchestrator.stop().await;
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler stops")
        .unwrap();
    assert!(!h.orchestrator.get_status().await.is_running);
}

#[tokio::test]
async fn test_lagging_positions_read_after_manual_close_records_one_outcome() {
    let btc = test_position("BTCUSDT", PositionSide::Long, 48_000.0, 0.01);
    let exchange = funded_exchange(1000.0).with_position(btc.clone());
    let h = setup(exchange, MockDecisionProvider::new()).await;
    completed(h.orchestrator.tick().await);

    h.orchestrator
        .close_position("BTCUSDT", PositionSide::Long)
        .await
        .unwrap()
        .expect("outcome recorded");

    // one stale read still shows the closed position
    h.exchange.set_positions(vec![btc.clone()]);
    let record = completed(h.orchestrator.tick().await);
    assert!(record.positions.is_empty());
    assert!(h.repo.get_position_open_time(&btc.key()).await.unwrap().is_none());

    h.exchange.clear_calls();
    let err = h
        .orchestrator
        .close_position("BTCUSDT", PositionSide::Long)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Execution(ExecutionError::NoPosition(_))
    ));
    assert!(h.exchange.order_calls().is_empty());

    h.exchange.set_positions(Vec::new());
    completed(h.orchestrator.tick().await);

    assert_eq!(h.repo.count_trade_outcomes().await.unwrap(), 1);
    assert!((h.orchestrator.get_status().await.daily_pnl - 20.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_open_never_reported_is_recorded_after_settle_window() {
    let mut open = Decision::new("BTCUSDT", Action::OpenLong);
    open.position_size_usd = 100.0;
    let provider = MockDecisionProvider::new().with_decisions(vec![open]);
    let h = setup_with(
        funded_exchange(1000.0),
        provider,
        &[("POSITION_SETTLE_MINUTES", "0")],
    )
    .await;

    completed(h.orchestrator.tick().await);
    h.exchange.set_positions(Vec::new());
    completed(h.orchestrator.tick().await);

    let outcomes = h.repo.get_recent_trade_outcomes(10).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].close_trigger, CloseTrigger::AutoTrigger);
    assert_eq!(outcomes[0].fill_source, FillSource::Snapshot);
}
