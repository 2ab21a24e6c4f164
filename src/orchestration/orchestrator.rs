use crate::config::Config;
use crate::db::{Repository, StoreError};
use crate::domain::{
    sort_by_priority, AccountSnapshot, CloseTrigger, DecisionCycleRecord, FillSource, Position,
    PositionKey, PositionSide, TimeMs, TradeOutcome,
};
use crate::engine::outcome::MANUAL_EXIT;
use crate::engine::{MarketSnapshot, PositionBook, RiskBreach, RiskGovernor};
use crate::exchange::{Exchange, ExchangeError};
use crate::orchestration::analysis::PerformanceAnalyzer;
use crate::orchestration::deadline::{Deadline, DeadlineElapsed};
use crate::orchestration::executor::ExecutionError;
use crate::orchestration::learning::spawn_learning_pass;
use crate::orchestration::recorder::{ClosedPosition, OutcomeRecorder};
use crate::provider::{CandidateMarket, Context, DecisionProvider, ProviderError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("risk control: cooling down, {remaining_minutes} minutes remaining")]
    CoolingDown { remaining_minutes: i64 },
    #[error("risk control: {breach}, trading stopped until {until}")]
    RiskBreach { breach: RiskBreach, until: TimeMs },
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Deadline(#[from] DeadlineElapsed),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("orchestrator stopped")]
    Stopped,
}

/// What a single scheduler tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Paused: no external call was made and no counter moved.
    Paused,
    /// Another cycle still held the in-flight guard.
    Overlapping,
    Completed(Box<DecisionCycleRecord>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraderStatus {
    pub is_running: bool,
    pub is_paused: bool,
    pub cycle_number: u64,
    pub call_count: u64,
    pub position_count: usize,
    pub daily_pnl: f64,
    pub stop_until: Option<TimeMs>,
    pub started_at: TimeMs,
}

/// In-memory state shared between the scheduler and control calls.
#[derive(Debug)]
pub(crate) struct RuntimeState {
    pub is_paused: bool,
    pub is_running: bool,
    /// Cycles run since this process started.
    pub call_count: u64,
    /// Monotonic across restarts; seeded from the store.
    pub cycle_number: u64,
    pub book: PositionBook,
    pub risk: RiskGovernor,
    pub started_at: TimeMs,
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub config: Config,
    pub exchange: Arc<dyn Exchange>,
    pub provider: Arc<dyn DecisionProvider>,
    pub repo: Arc<Repository>,
    pub recorder: OutcomeRecorder,
    pub analyzer: PerformanceAnalyzer,
    pub state: RwLock<RuntimeState>,
    /// Single permit: one cycle or manual close in flight at a time.
    pub cycle_guard: Semaphore,
    pub shutdown: Notify,
}

/// Drives the decision cycle. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build an orchestrator, restoring the paused flag and cycle numbering
    /// from the store.
    pub async fn new(
        config: Config,
        exchange: Arc<dyn Exchange>,
        provider: Arc<dyn DecisionProvider>,
        repo: Arc<Repository>,
    ) -> Result<Self, OrchestrationError> {
        let is_paused = repo
            .get_runtime_state()
            .await?
            .map(|s| s.is_paused)
            .unwrap_or(false);
        let cycle_number = repo.get_latest_cycle_number().await?;
        let now = TimeMs::now();

        if is_paused {
            info!("Restored paused state from store");
        }

        let state = RuntimeState {
            is_paused,
            is_running: false,
            call_count: 0,
            cycle_number,
            book: PositionBook::default(),
            risk: RiskGovernor::new(config.stop_trading_minutes, now),
            started_at: now,
        };

        let inner = Inner {
            recorder: OutcomeRecorder::new(repo.clone(), config.premature_exit_minutes),
            analyzer: PerformanceAnalyzer::new(
                repo.clone(),
                config.performance_lookback_cycles,
                config.premature_exit_minutes,
            ),
            config,
            exchange,
            provider,
            repo,
            state: RwLock::new(state),
            cycle_guard: Semaphore::new(1),
            shutdown: Notify::new(),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Start the scheduler loop. Each tick runs on its own task.
    ///
    /// Returns `None` when the scheduler is already running.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        {
            let mut state = self.inner.state.write().await;
            if state.is_running {
                warn!("Scheduler already running");
                return None;
            }
            state.is_running = true;
            state.started_at = TimeMs::now();
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let period = this.inner.config.scan_interval();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = period.as_secs(), "Scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let ticker = this.clone();
                        tokio::spawn(async move {
                            ticker.tick().await;
                        });
                    }
                    _ = this.inner.shutdown.notified() => break,
                }
            }

            info!("Scheduler stopped");
        });
        Some(handle)
    }

    /// Stop scheduling new ticks. A cycle already in flight runs to completion.
    pub async fn stop(&self) {
        self.inner.state.write().await.is_running = false;
        self.inner.shutdown.notify_one();
    }

    pub async fn pause(&self) -> Result<(), OrchestrationError> {
        self.set_paused(true).await
    }

    pub async fn resume(&self) -> Result<(), OrchestrationError> {
        self.set_paused(false).await
    }

    async fn set_paused(&self, paused: bool) -> Result<(), OrchestrationError> {
        let mut state = self.inner.state.write().await;
        self.inner.repo.save_runtime_state(paused).await?;
        state.is_paused = paused;
        info!(paused, "Trader pause flag changed");
        Ok(())
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.state.read().await.is_paused
    }

    pub async fn get_status(&self) -> TraderStatus {
        let state = self.inner.state.read().await;
        let risk = state.risk.state();
        TraderStatus {
            is_running: state.is_running,
            is_paused: state.is_paused,
            cycle_number: state.cycle_number,
            call_count: state.call_count,
            position_count: state.book.last_known.len(),
            daily_pnl: risk.daily_pnl,
            stop_until: risk.stop_until,
            started_at: state.started_at,
        }
    }

    /// Last reconciled positions, with open times from first-seen tracking.
    pub async fn get_positions(&self) -> Vec<Position> {
        let state = self.inner.state.read().await;
        let mut positions: Vec<Position> = state
            .book
            .last_known
            .values()
            .map(|p| with_open_time(p.clone(), &state.book.first_seen))
            .collect();
        positions.sort_by_key(Position::key);
        positions
    }

    /// Suspend trading until `until`, as if a risk threshold had tripped.
    pub async fn set_stop_until(&self, until: TimeMs) {
        self.inner.state.write().await.risk.stop_until(until);
        info!(%until, "Trading stopped by request");
    }

    /// Run one tick: skipped while paused or while another cycle is in flight.
    pub async fn tick(&self) -> TickOutcome {
        if self.is_paused().await {
            debug!("Trader paused, skipping tick");
            return TickOutcome::Paused;
        }
        let Ok(_permit) = self.inner.cycle_guard.try_acquire() else {
            warn!("Previous cycle still running, skipping tick");
            return TickOutcome::Overlapping;
        };
        let record = self.inner.run_cycle().await;
        TickOutcome::Completed(Box::new(record))
    }

    /// Close a live position on request. Goes through the same close funnel
    /// as decision closes and reconciliation.
    ///
    /// Returns the recorded outcome, or `None` when this lifecycle was
    /// already recorded.
    pub async fn close_position(
        &self,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<TradeOutcome>, OrchestrationError> {
        let _permit = self
            .inner
            .cycle_guard
            .acquire()
            .await
            .map_err(|_| OrchestrationError::Stopped)?;
        if self.is_paused().await {
            return Err(ExecutionError::Paused.into());
        }
        self.inner.close_manually(symbol, side).await
    }
}

fn with_open_time(mut position: Position, first_seen: &HashMap<PositionKey, TimeMs>) -> Position {
    position.opened_at = first_seen.get(&position.key()).copied();
    position
}

impl Inner {
    fn deadline(&self) -> Deadline {
        Deadline::new(self.config.cycle_timeout(), self.config.call_timeout())
    }

    /// Run one full cycle and persist its record. Never fails: every error
    /// ends up in the record.
    async fn run_cycle(&self) -> DecisionCycleRecord {
        let deadline = self.deadline();
        let now = TimeMs::now();
        let (cycle_number, call_count) = {
            let mut state = self.state.write().await;
            state.cycle_number += 1;
            state.call_count += 1;
            (state.cycle_number, state.call_count)
        };
        info!(cycle = cycle_number, "Decision cycle started");

        let mut record = DecisionCycleRecord::new(cycle_number, now);
        match self.drive_cycle(&mut record, call_count, &deadline).await {
            Ok(()) => {
                let failed = record.executions.iter().filter(|e| !e.success).count();
                info!(
                    cycle = cycle_number,
                    decisions = record.decisions.len(),
                    executions = record.executions.len(),
                    failed,
                    "Decision cycle completed"
                );
            }
            Err(e @ OrchestrationError::CoolingDown { .. }) => {
                info!(cycle = cycle_number, reason = %e, "Cycle skipped");
                record.fail(e.to_string());
            }
            Err(e) => {
                warn!(cycle = cycle_number, error = %e, "Decision cycle failed");
                record.fail(e.to_string());
            }
        }

        let save = tokio::time::timeout(
            self.config.call_timeout(),
            self.repo.save_cycle_record(&record),
        )
        .await;
        match save {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(cycle = cycle_number, error = %e, "Failed to persist cycle record"),
            Err(_) => warn!(cycle = cycle_number, "Persisting cycle record timed out"),
        }

        let interval = self.config.ai_learning_interval;
        if self.config.ai_learning_enabled && interval > 0 && cycle_number % interval == 0 {
            debug!(cycle = cycle_number, "Triggering learning pass");
            spawn_learning_pass(
                self.repo.clone(),
                self.provider.clone(),
                self.config.call_timeout(),
            );
        }

        record
    }

    async fn drive_cycle(
        &self,
        record: &mut DecisionCycleRecord,
        call_count: u64,
        deadline: &Deadline,
    ) -> Result<(), OrchestrationError> {
        let now = record.timestamp;
        {
            let mut state = self.state.write().await;
            if let Some(remaining_minutes) = state.risk.cooldown_remaining(now) {
                return Err(OrchestrationError::CoolingDown { remaining_minutes });
            }
            if state.risk.reset_daily_if_due(now) {
                info!("Daily P&L reset");
            }
        }

        let live = deadline
            .run("get positions", self.exchange.get_positions())
            .await??;
        let auto_closed = self.reconcile(&live, deadline).await;
        if auto_closed > 0 {
            info!(count = auto_closed, "Recorded exchange-side closes");
        }

        let (positions, started_at) = {
            let state = self.state.read().await;
            let positions: Vec<Position> = live
                .into_iter()
                .filter(|p| !state.book.recently_closed.contains_key(&p.key()))
                .map(|p| with_open_time(p, &state.book.first_seen))
                .collect();
            (positions, state.started_at)
        };
        record.positions = positions.clone();

        let balance = deadline
            .run("get balance", self.exchange.get_balance())
            .await??;
        let account = AccountSnapshot::compute(&balance, &positions, self.config.initial_balance);
        record.account = Some(account);

        {
            let mut state = self.state.write().await;
            let daily_pnl = state.risk.state().daily_pnl;
            let breach = self.config.risk_limits().check(
                daily_pnl,
                account.total_equity,
                self.config.initial_balance,
            );
            if let Some(breach) = breach {
                let until = state.risk.trip(now);
                warn!(%breach, %until, "Risk threshold breached, entering cooldown");
                return Err(OrchestrationError::RiskBreach { breach, until });
            }
        }

        let candidates = self.collect_candidates(&positions, deadline).await;
        record.candidate_symbols = candidates.iter().map(|c| c.symbol.clone()).collect();

        let performance = match deadline.run("performance summary", self.analyzer.summarize()).await {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                warn!(error = %e, "Performance summary unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "Performance summary unavailable");
                None
            }
        };
        let learning_summary = match deadline
            .run("learning summary", self.repo.get_active_learning_summary())
            .await
        {
            Ok(Ok(summary)) => summary.map(|s| s.summary),
            Ok(Err(e)) => {
                warn!(error = %e, "Learning summary unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "Learning summary unavailable");
                None
            }
        };

        let context = Context {
            current_time: now,
            runtime_minutes: now.minutes_since(started_at).max(0),
            call_count,
            account,
            positions,
            candidates,
            performance,
            learning_summary,
            max_positions: self.config.max_positions,
            btc_eth_leverage: self.config.btc_eth_leverage,
            altcoin_leverage: self.config.altcoin_leverage,
        };

        let response = match deadline
            .run("decision provider", self.provider.decide(&context))
            .await?
        {
            Ok(response) => response,
            Err(e) => {
                record.prompt = e.prompt.clone();
                record.cot_trace = e.cot_trace.clone();
                return Err(e.into());
            }
        };
        record.prompt = response.prompt;
        record.cot_trace = response.cot_trace;
        record.decisions = response.decisions;

        let ordered = sort_by_priority(&record.decisions);
        record.executions = self.execute_decisions(&ordered, deadline).await;
        record.success = true;
        Ok(())
    }

    /// Configured candidates plus every symbol with a live position.
    async fn collect_candidates(
        &self,
        positions: &[Position],
        deadline: &Deadline,
    ) -> Vec<CandidateMarket> {
        let mut symbols = self.config.candidate_symbols.clone();
        for position in positions {
            if !symbols.contains(&position.symbol) {
                symbols.push(position.symbol.clone());
            }
        }

        let fetches = symbols
            .iter()
            .map(|symbol| self.fetch_candidate(symbol, deadline));
        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn fetch_candidate(&self, symbol: &str, deadline: &Deadline) -> Option<CandidateMarket> {
        let klines = self.exchange.get_klines(
            symbol,
            &self.config.kline_interval,
            self.config.kline_limit,
        );
        let klines = match deadline.run("get klines", klines).await {
            Ok(Ok(klines)) if !klines.is_empty() => klines,
            Ok(Ok(_)) => {
                warn!(%symbol, "No market data, dropping candidate");
                return None;
            }
            Ok(Err(e)) => {
                warn!(%symbol, error = %e, "Market data fetch failed, dropping candidate");
                return None;
            }
            Err(e) => {
                warn!(%symbol, error = %e, "Market data fetch failed, dropping candidate");
                return None;
            }
        };

        let indicators = MarketSnapshot::compute(&klines);
        let price = match deadline
            .run("get market price", self.exchange.get_market_price(symbol))
            .await
        {
            Ok(Ok(price)) if price > 0.0 => price,
            _ => indicators.price,
        };

        Some(CandidateMarket {
            symbol: symbol.to_string(),
            price,
            indicators,
        })
    }

    /// The close funnel. Every close trigger records through here so one
    /// lifecycle produces at most one outcome.
    ///
    /// The book forgets the position only after the store write succeeds; on
    /// failure it stays tracked and reconciliation retries it. Once recorded,
    /// the key is remembered as closed so a lagging positions read cannot
    /// start a second lifecycle for it.
    pub(crate) async fn record_close(
        &self,
        closed: ClosedPosition,
        deadline: &Deadline,
    ) -> Result<Option<TradeOutcome>, OrchestrationError> {
        let key = closed.position.key();
        let fallback = self.state.read().await.book.first_seen.get(&key).copied();
        let outcome = deadline
            .run("record outcome", self.recorder.record_close(&closed, fallback))
            .await??;

        let mut state = self.state.write().await;
        state.book.close(&key, closed.closed_at);
        if let Some(outcome) = &outcome {
            state.risk.record_pnl(outcome.pnl);
        }
        Ok(outcome)
    }

    async fn close_manually(
        &self,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<TradeOutcome>, OrchestrationError> {
        let deadline = Deadline::new(self.config.call_timeout() * 3, self.config.call_timeout());
        let key = PositionKey::new(symbol, side);
        if self.state.read().await.book.recently_closed.contains_key(&key) {
            return Err(ExecutionError::NoPosition(key).into());
        }
        let live = deadline
            .run("get positions", self.exchange.get_positions())
            .await??;
        let position = live
            .into_iter()
            .find(|p| p.key() == key)
            .ok_or_else(|| ExecutionError::NoPosition(key.clone()))?;

        let close_price = self.close_price(&position, &deadline).await;
        let order = match side {
            PositionSide::Long => self.exchange.close_long(symbol, position.quantity),
            PositionSide::Short => self.exchange.close_short(symbol, position.quantity),
        };
        let ack = deadline.run("close order", order).await??;
        info!(position = %key, order_id = %ack.order_id, "Manual close filled");

        let closed = ClosedPosition {
            quantity: position.quantity,
            position,
            close_price,
            realized_pnl: None,
            closed_at: TimeMs::now(),
            trigger: CloseTrigger::Manual,
            fill_source: FillSource::Order,
            exit_reason: MANUAL_EXIT.to_string(),
        };
        self.record_close(closed, &deadline).await
    }

    /// Current market price, falling back to the position's mark.
    pub(crate) async fn close_price(&self, position: &Position, deadline: &Deadline) -> f64 {
        match deadline
            .run("get market price", self.exchange.get_market_price(&position.symbol))
            .await
        {
            Ok(Ok(price)) if price > 0.0 => price,
            _ => position.mark_price,
        }
    }
}
