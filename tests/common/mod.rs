//! Common test utilities and fixtures

#![allow(dead_code)]

use adaptive_trader::config::AppConfig;
use adaptive_trader::connectors::traits::ExchangeGateway;
use adaptive_trader::core::shutdown::RetryTimer;
use adaptive_trader::error::{GatewayError, SignalError};
use adaptive_trader::strategies::traits::SignalProvider;
use adaptive_trader::types::{
    Balance, Candle, Indicators, MarketSnapshot, OrderRequest, OrderResponse, TradeSignal,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PAIR: &str = "PIUSDT";

/// Config with persistence off and millisecond backoff.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.engine.state_file = String::new();
    config.engine.profit_file = String::new();
    config.engine.degraded_after_failures = 2;
    config.execution.retry_base_delay_ms = 1;
    config
}

pub fn candle(close: Decimal) -> Candle {
    Candle {
        open_time: 1_704_067_200_000,
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(100),
    }
}

/// Snapshot whose latest close is `price`, volatility 1% and no trend.
pub fn snapshot_at(price: Decimal) -> MarketSnapshot {
    snapshot_with(price, Indicators::default())
}

pub fn snapshot_with(price: Decimal, indicators: Indicators) -> MarketSnapshot {
    let candles = vec![candle(price); 5];
    MarketSnapshot::with_indicators(PAIR, candles, indicators)
}

pub fn starting_balance() -> Balance {
    Balance::new().with("USDT", dec!(1000)).with("PI", dec!(0))
}

/// Scriptable exchange. Unscripted order submissions succeed.
pub struct FakeGateway {
    pub snapshot: Mutex<Option<MarketSnapshot>>,
    pub snapshot_error: Mutex<Option<GatewayError>>,
    pub balance: Mutex<Balance>,
    pub live_price: Mutex<Result<Decimal, GatewayError>>,
    pub submit_script: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub submitted: Mutex<Vec<OrderRequest>>,
    pub balance_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new(price: Decimal) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot_at(price))),
            snapshot_error: Mutex::new(None),
            balance: Mutex::new(starting_balance()),
            live_price: Mutex::new(Ok(price)),
            submit_script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            balance_calls: AtomicUsize::new(0),
        }
    }

    /// Moves both the candle close and the live ticker to `price`.
    pub fn set_price(&self, price: Decimal) {
        *self.snapshot.lock().unwrap() = Some(snapshot_at(price));
        *self.live_price.lock().unwrap() = Ok(price);
    }

    pub fn script_submits(&self, results: Vec<Result<(), GatewayError>>) {
        self.submit_script.lock().unwrap().extend(results);
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeGateway for FakeGateway {
    async fn fetch_snapshot(&self, _pair: &str) -> Result<Option<MarketSnapshot>, GatewayError> {
        if let Some(err) = self.snapshot_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn fetch_balance(&self) -> Result<Balance, GatewayError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance.lock().unwrap().clone())
    }

    async fn fetch_live_price(&self, _pair: &str) -> Result<Decimal, GatewayError> {
        self.live_price.lock().unwrap().clone()
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        self.submitted.lock().unwrap().push(request.clone());
        let scripted = self.submit_script.lock().unwrap().pop_front();
        match scripted.unwrap_or(Ok(())) {
            Ok(()) => Ok(OrderResponse {
                id: format!("ORD-{}", request.client_order_id),
                symbol: request.pair.clone(),
                status: "FILLED".to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn cancel_order(&self, _pair: &str, _order_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Records requested backoff delays instead of sleeping.
#[derive(Default)]
pub struct RecordingTimer {
    pub delays: Mutex<Vec<Duration>>,
    /// When set, the first wait reports an interrupted sleep.
    pub cancel_on_wait: bool,
    cancelled: AtomicBool,
}

impl RecordingTimer {
    pub fn cancelling() -> Self {
        Self {
            cancel_on_wait: true,
            ..Self::default()
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetryTimer for RecordingTimer {
    async fn wait(&self, delay: Duration) -> bool {
        self.delays.lock().unwrap().push(delay);
        if self.cancel_on_wait {
            self.cancelled.store(true, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Plays back a fixed list of signals, then holds.
#[derive(Default)]
pub struct ScriptedProvider {
    pub signals: VecDeque<Result<TradeSignal, SignalError>>,
    /// Shared so tests can read it after the provider moves into the engine.
    pub retrain_calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(signals: Vec<Result<TradeSignal, SignalError>>) -> Self {
        Self {
            signals: signals.into(),
            retrain_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SignalProvider for ScriptedProvider {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn generate_signal(&mut self, _snapshot: &MarketSnapshot) -> Result<TradeSignal, SignalError> {
        self.signals.pop_front().unwrap_or(Ok(TradeSignal::Hold))
    }

    async fn retrain(&mut self) -> Result<(), SignalError> {
        self.retrain_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
