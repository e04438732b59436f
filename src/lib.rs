//! Adaptive single-pair trading engine.
//!
//! Each tick the [`TradingLoop`] pulls a market snapshot, adapts its strategy
//! phase, asks a [`SignalProvider`] for a signal, sizes it with the
//! [`RiskSizer`], submits it through the [`OrderPipeline`] and books the fill
//! in the [`PositionLedger`]. Prediction accuracy feeds back into retraining.

pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod strategies;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use crate::config::AppConfig;
pub use crate::connectors::spot::SpotClient;
pub use crate::connectors::traits::ExchangeGateway;
pub use crate::core::engine::{CycleReport, EngineStatus, SkipReason, TradingLoop};
pub use crate::core::feedback::{FeedbackController, RetrainOutcome};
pub use crate::core::ledger::PositionLedger;
pub use crate::core::phase::PhaseAdapter;
pub use crate::core::pipeline::OrderPipeline;
pub use crate::core::risk::RiskSizer;
pub use crate::core::shutdown::{RetryTimer, Shutdown, ShutdownTrigger};
pub use crate::error::{EngineError, GatewayError, LedgerError, OrderError, SignalError};
pub use crate::strategies::scalper::SimpleScalper;
pub use crate::strategies::traits::SignalProvider;
pub use crate::types::{
    Balance, EngineEvent, MarketSnapshot, Position, Side, StrategyPhase, TradeDecision, TradeSignal,
};
