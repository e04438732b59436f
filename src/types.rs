// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw directional forecast produced once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSignal {
    Buy,
    Sell,
    Hold,
}

impl TradeSignal {
    /// The order side this signal asks for, `None` for HOLD.
    pub fn side(self) -> Option<Side> {
        match self {
            TradeSignal::Buy => Some(Side::Buy),
            TradeSignal::Sell => Some(Side::Sell),
            TradeSignal::Hold => None,
        }
    }
}

impl From<Side> for TradeSignal {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => TradeSignal::Buy,
            Side::Sell => TradeSignal::Sell,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: u64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
}

impl Trend {
    pub fn is_trending(self) -> bool {
        matches!(self, Trend::Bullish | Trend::Bearish)
    }
}

/// Indicators derived from the candles of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub trend: Trend,
    /// Short MA distance from the long MA, in percent of the long MA.
    pub trend_strength: f64,
    /// Standard deviation of percentage returns, in percent.
    pub volatility: f64,
    /// Rate of change over the momentum window, in percent.
    pub momentum: f64,
    pub support: Decimal,
    pub resistance: Decimal,
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            trend: Trend::Sideways,
            trend_strength: 0.0,
            volatility: 1.0,
            momentum: 0.0,
            support: Decimal::ZERO,
            resistance: Decimal::ZERO,
        }
    }
}

/// Immutable slice of recent market data plus derived indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub pair: String,
    pub candles: Vec<Candle>,
    pub indicators: Indicators,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn latest_price(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.close)
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.candles.iter().map(|c| c.close)
    }
}

/// Available quantity per asset symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    assets: HashMap<String, Decimal>,
}

impl Balance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, asset: &str, amount: Decimal) -> Self {
        self.set(asset, amount);
        self
    }

    /// Missing assets read as zero.
    pub fn get(&self, asset: &str) -> Decimal {
        self.assets.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn set(&mut self, asset: &str, amount: Decimal) {
        self.assets.insert(asset.to_string(), amount);
    }

    pub fn assets(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.assets.iter()
    }
}

/// Output of the risk sizer. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub valid: bool,
    pub reason: Option<String>,
    pub side: Option<Side>,
    pub position_size: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

impl TradeDecision {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            side: None,
            position_size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.position_size * self.entry_price
    }
}

pub type PositionId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Buy => (price - self.entry_price) * self.size,
            Side::Sell => (self.entry_price - price) * self.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub signal: TradeSignal,
    pub entry_price: Decimal,
    pub outcome_price: Decimal,
    pub correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyPhase {
    Scalping,
    Swing,
    Grid,
    Momentum,
}

impl fmt::Display for StrategyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyPhase::Scalping => "scalping",
            StrategyPhase::Swing => "swing",
            StrategyPhase::Grid => "grid",
            StrategyPhase::Momentum => "momentum",
        };
        f.write_str(name)
    }
}

/// One order attempt as sent to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair: String,
    pub side: Side,
    pub size: Decimal,
    /// Unique per attempt; gateways with idempotency keys use it to drop duplicates.
    pub client_order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub client_order_id: String,
    pub side: Side,
    pub size: Decimal,
    pub status: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    CounterTrade,
    Manual,
}

/// Structured events pushed to the outward observability sink.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    DecisionMade(TradeDecision),
    DecisionRejected { signal: TradeSignal, reason: String },
    OrderFilled(OrderResult),
    OrderFailed { side: Side, reason: String },
    PhaseTransition { from: StrategyPhase, to: StrategyPhase },
    RetrainTriggered { accuracy: Option<f64> },
    PositionClosed { position: Position, reason: ExitReason, pnl: Decimal },
    HealthChanged { degraded: bool, consecutive_failures: u32 },
}
