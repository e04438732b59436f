// src/strategies/traits.rs
use async_trait::async_trait;

use crate::error::SignalError;
use crate::types::{MarketSnapshot, TradeSignal};

/// The prediction model behind the engine.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    fn name(&self) -> String;

    /// Raw directional forecast for one snapshot.
    async fn generate_signal(&mut self, snapshot: &MarketSnapshot) -> Result<TradeSignal, SignalError>;

    /// Training entry point. Implementations doing heavy work should hand it off
    /// and return promptly; the engine awaits this inside its critical section.
    async fn retrain(&mut self) -> Result<(), SignalError>;
}
