// src/core/engine.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::connectors::traits::ExchangeGateway;
use crate::core::feedback::{FeedbackController, RetrainOutcome};
use crate::core::ledger::PositionLedger;
use crate::core::phase::PhaseAdapter;
use crate::core::pipeline::OrderPipeline;
use crate::core::profit::{ProfitSummary, ProfitTracker};
use crate::core::risk::RiskSizer;
use crate::core::shutdown::{RetryTimer, Shutdown};
use crate::error::{EngineError, LedgerError, OrderError};
use crate::strategies::traits::SignalProvider;
use crate::types::{
    Balance, EngineEvent, ExitReason, OrderResult, Position, PositionId, StrategyPhase, TradeSignal,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct EngineState {
    positions: Vec<Position>,
    phase: Option<StrategyPhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMarketData,
    SlippageExceeded,
    ShuttingDown,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    Skipped(SkipReason),
    Held { phase: StrategyPhase },
    Rejected { reason: String },
    Executed { order: OrderResult, position: Position },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub cycle: u64,
    pub phase: StrategyPhase,
    pub balance: Balance,
    pub open_positions: Vec<Position>,
    pub accuracy: Option<f64>,
    pub predictions: u32,
    pub outcomes: usize,
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub profit: ProfitSummary,
}

/// Everything a cycle mutates. Only reachable through the loop's mutex.
struct CycleState<S> {
    provider: S,
    ledger: PositionLedger,
    feedback: FeedbackController,
    phase: PhaseAdapter,
    profit: ProfitTracker,
    cycle: u64,
    trades_since_retrain: u32,
    consecutive_failures: u32,
    degraded: bool,
}

pub struct TradingLoop<S> {
    config: AppConfig,
    gateway: Arc<dyn ExchangeGateway>,
    sizer: RiskSizer,
    pipeline: OrderPipeline,
    shutdown: Shutdown,
    event_sender: Option<mpsc::Sender<EngineEvent>>,
    state: Mutex<CycleState<S>>,
}

impl<S> TradingLoop<S>
where
    S: SignalProvider,
{
    /// Seeds the ledger from the exchange balance and restores persisted state.
    pub async fn bootstrap(
        config: AppConfig,
        gateway: Arc<dyn ExchangeGateway>,
        provider: S,
        shutdown: Shutdown,
    ) -> Result<Self, EngineError> {
        let exchange = &config.exchange;
        let balance = gateway.fetch_balance().await?;
        let mut ledger = PositionLedger::new(&exchange.base_asset, &exchange.quote_asset, balance);
        let mut phase = PhaseAdapter::new(&config.adaptation);

        if let Some(state) = load_state(&config.engine.state_file).await {
            info!(
                positions = state.positions.len(),
                phase = ?state.phase,
                "Restored engine state"
            );
            ledger.restore(state.positions);
            if let Some(p) = state.phase {
                phase.restore(p);
            }
        }

        let profit = if config.engine.profit_file.is_empty() {
            ProfitTracker::in_memory()
        } else {
            ProfitTracker::load(&config.engine.profit_file).await
        };

        let timer: Arc<dyn RetryTimer> = Arc::new(shutdown.clone());
        let pipeline = OrderPipeline::new(gateway.clone(), timer, &config.execution, &exchange.pair);
        let sizer = RiskSizer::new(&config.risk, &exchange.base_asset, &exchange.quote_asset);

        info!(
            model = %provider.name(),
            pair = %exchange.pair,
            live = exchange.live_trading,
            "Trading loop ready"
        );

        let state = CycleState {
            provider,
            ledger,
            feedback: FeedbackController::new(&config.learning),
            phase,
            profit,
            cycle: 0,
            trades_since_retrain: 0,
            consecutive_failures: 0,
            degraded: false,
        };

        Ok(Self {
            config,
            gateway,
            sizer,
            pipeline,
            shutdown,
            event_sender: None,
            state: Mutex::new(state),
        })
    }

    /// Forwards structured events to an outward sink.
    pub fn with_events(mut self, sender: mpsc::Sender<EngineEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    fn emit(&self, event: EngineEvent) {
        let Some(sender) = &self.event_sender else { return };
        match sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Event channel closed! Observability sink is likely dead.");
            }
        }
    }

    /// Calls `run_cycle` every `tick_interval` until shutdown.
    pub async fn run(&self, tick_interval: Duration) {
        info!(tick = ?tick_interval, "Engine loop running");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.run_cycle().await {
                Ok(report) => debug!(?report, "Cycle finished"),
                Err(e) => error!(error = %e, "Trading cycle failed"),
            }
            if !self.shutdown.wait(tick_interval).await {
                break;
            }
        }
        info!("Engine loop stopped");
    }

    /// One full decision cycle, serialized against every other cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let result = self.execute_cycle(state).await;
        self.track_health(state, &result);
        result
    }

    pub async fn status(&self) -> EngineStatus {
        let state = self.state.lock().await;
        EngineStatus {
            cycle: state.cycle,
            phase: state.phase.current(),
            balance: state.ledger.balance().clone(),
            open_positions: state.ledger.positions().cloned().collect(),
            accuracy: state.feedback.accuracy(),
            predictions: state.feedback.window().predictions(),
            outcomes: state.feedback.window().len(),
            degraded: state.degraded,
            consecutive_failures: state.consecutive_failures,
            profit: state.profit.summary().clone(),
        }
    }

    /// Removes a position on behalf of an external monitor. Balance is untouched.
    pub async fn close_position(&self, id: PositionId) -> Result<Position, LedgerError> {
        let mut state = self.state.lock().await;
        let pos = state.ledger.close_position(id)?;
        self.save_state(&state).await;
        // nothing was traded, so nothing is realized
        self.emit(EngineEvent::PositionClosed {
            position: pos.clone(),
            reason: ExitReason::Manual,
            pnl: Decimal::ZERO,
        });
        Ok(pos)
    }

    async fn execute_cycle(&self, state: &mut CycleState<S>) -> Result<CycleReport, EngineError> {
        if self.shutdown.is_cancelled() {
            return Ok(CycleReport::Skipped(SkipReason::ShuttingDown));
        }
        let pair = &self.config.exchange.pair;

        // 1. Market data
        let snapshot = match self.gateway.fetch_snapshot(pair).await? {
            Some(s) if !s.is_empty() => s,
            _ => {
                warn!(pair = %pair, "Market data is empty or missing. Skipping cycle.");
                return Ok(CycleReport::Skipped(SkipReason::NoMarketData));
            }
        };
        let Some(price) = snapshot.latest_price() else {
            return Ok(CycleReport::Skipped(SkipReason::NoMarketData));
        };

        state.cycle += 1;
        let cycle = state.cycle;

        if self.config.exchange.live_trading {
            let balance = self.gateway.fetch_balance().await?;
            state.ledger.reconcile(balance);
        }

        // 2. Bookkeeping that depends only on price
        let resolved = state.feedback.resolve_due(price, cycle);
        if resolved > 0 {
            debug!(resolved, accuracy = ?state.feedback.accuracy(), "Scored pending predictions");
        }
        self.monitor_exits(state, price).await?;

        // 3. Regime
        let before = state.phase.current();
        let phase = state.phase.adjust(&snapshot);
        if phase != before {
            self.emit(EngineEvent::PhaseTransition { from: before, to: phase });
            self.save_state(state).await;
        }

        // 4. Signal
        let signal = match state.provider.generate_signal(&snapshot).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!(error = %e, "Model unavailable, holding");
                TradeSignal::Hold
            }
        };
        let Some(side) = signal.side() else {
            info!(phase = %phase, "Model decided to HOLD. No trade this cycle.");
            return Ok(CycleReport::Held { phase });
        };

        // 5. Risk
        let decision = self.sizer.evaluate(signal, &snapshot, state.ledger.balance());
        if !decision.valid {
            let reason = decision.reason.clone().unwrap_or_default();
            warn!(signal = ?signal, reason = %reason, "Trade not valid. Skipping.");
            self.emit(EngineEvent::DecisionRejected {
                signal,
                reason: reason.clone(),
            });
            return Ok(CycleReport::Rejected { reason });
        }
        self.emit(EngineEvent::DecisionMade(decision.clone()));

        // 6. Execute
        let order = match self.pipeline.submit(&decision, side).await {
            Ok(order) => order,
            Err(OrderError::SlippageExceeded { .. }) => {
                return Ok(CycleReport::Skipped(SkipReason::SlippageExceeded));
            }
            Err(OrderError::Cancelled { attempts }) => {
                warn!(attempts, "Order abandoned on shutdown");
                return Ok(CycleReport::Skipped(SkipReason::ShuttingDown));
            }
            Err(e) => {
                self.emit(EngineEvent::OrderFailed {
                    side,
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };
        self.emit(EngineEvent::OrderFilled(order.clone()));

        // 7. Record
        let fill = state.ledger.apply_fill(&decision, side)?;
        for closed in fill.closed {
            self.book_close(state, closed.position, ExitReason::CounterTrade, closed.pnl)
                .await;
        }
        state.feedback.track(signal, decision.entry_price, cycle);
        info!(
            side = %side,
            size = %decision.position_size,
            notional = %decision.notional(),
            pair = %pair,
            order_id = %order.order_id,
            "Trade executed"
        );

        self.check_retrain(state).await;
        self.save_state(state).await;

        Ok(CycleReport::Executed {
            order,
            position: fill.position,
        })
    }

    async fn monitor_exits(&self, state: &mut CycleState<S>, price: Decimal) -> Result<(), EngineError> {
        for (id, reason) in state.ledger.triggered_exits(price) {
            let Some(position) = state.ledger.position(id).cloned() else {
                continue;
            };
            warn!(id, reason = ?reason, price = %price, "Exit level hit, closing position");

            match self.pipeline.submit_exit(&position).await {
                Ok(order) => self.emit(EngineEvent::OrderFilled(order)),
                Err(OrderError::Cancelled { .. }) => return Ok(()),
                Err(e) => {
                    self.emit(EngineEvent::OrderFailed {
                        side: position.side.opposite(),
                        reason: e.to_string(),
                    });
                    return Err(e.into());
                }
            }

            let closed = state.ledger.settle_exit(id, price)?;
            let pnl = closed.pnl_at(price);
            self.book_close(state, closed, reason, pnl).await;
            self.save_state(state).await;
        }
        Ok(())
    }

    async fn book_close(&self, state: &mut CycleState<S>, position: Position, reason: ExitReason, pnl: Decimal) {
        state.profit.record(pnl).await;
        self.emit(EngineEvent::PositionClosed {
            position,
            reason,
            pnl,
        });
    }

    async fn check_retrain(&self, state: &mut CycleState<S>) {
        state.trades_since_retrain += 1;
        let every = self.config.engine.retrain_every_trades;

        let outcome = if every > 0 && state.trades_since_retrain >= every {
            state.trades_since_retrain = 0;
            state.feedback.evaluate_now(&mut state.provider).await
        } else {
            state.feedback.maybe_retrain(&mut state.provider).await
        };

        match outcome {
            RetrainOutcome::Retrained { accuracy } => {
                state.trades_since_retrain = 0;
                info!(accuracy, "Model retrained, performance window cleared");
                self.emit(EngineEvent::RetrainTriggered {
                    accuracy: Some(accuracy),
                });
            }
            RetrainOutcome::Failed { accuracy, error } => {
                warn!(accuracy, error = %error, "Retrain attempt failed");
            }
            other => debug!(outcome = ?other, "Retrain check"),
        }
    }

    fn track_health(&self, state: &mut CycleState<S>, result: &Result<CycleReport, EngineError>) {
        match result {
            Ok(_) => {
                state.consecutive_failures = 0;
                if state.degraded {
                    state.degraded = false;
                    info!("Engine health restored");
                    self.emit(EngineEvent::HealthChanged {
                        degraded: false,
                        consecutive_failures: 0,
                    });
                }
            }
            Err(e) if e.is_fatal() => {
                state.consecutive_failures += 1;
                let threshold = self.config.engine.degraded_after_failures;
                if !state.degraded && threshold > 0 && state.consecutive_failures >= threshold {
                    state.degraded = true;
                    error!(
                        failures = state.consecutive_failures,
                        "Repeated fatal errors, engine degraded"
                    );
                    self.emit(EngineEvent::HealthChanged {
                        degraded: true,
                        consecutive_failures: state.consecutive_failures,
                    });
                }
            }
            Err(_) => {}
        }
    }

    async fn save_state(&self, state: &CycleState<S>) {
        if let Err(e) = write_state(&self.config.engine.state_file, state).await {
            error!("Failed to save bot state: {}", e);
        }
    }
}

async fn write_state<S>(path: &str, state: &CycleState<S>) -> Result<(), EngineError> {
    if path.is_empty() {
        return Ok(());
    }
    let snapshot = EngineState {
        positions: state.ledger.positions().cloned().collect(),
        phase: Some(state.phase.current()),
    };
    let data = serde_json::to_string_pretty(&snapshot).map_err(|e| EngineError::Persistence(e.to_string()))?;
    tokio::fs::write(path, data)
        .await
        .map_err(|e| EngineError::Persistence(format!("{}: {}", path, e)))
}

async fn load_state(path: &str) -> Option<EngineState> {
    if path.is_empty() {
        return None;
    }
    let data = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<EngineState>(&data) {
        Ok(state) => Some(state),
        Err(e) => {
            error!("Ignoring unreadable state file {}: {}", path, e);
            None
        }
    }
}
