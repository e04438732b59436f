// src/config.rs

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::core::feedback::MIN_OUTCOMES_FOR_RETRAIN;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub secret_key: String,
    pub base_url: String,
    /// Exchange symbol, e.g. "PIUSDT"
    pub pair: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub kline_interval: String,
    pub kline_limit: u16,
    pub symbol_step_size: Decimal,
    pub request_timeout_ms: u64,
    /// false = paper trading: orders are simulated, balance comes from `paper_quote_balance`
    pub live_trading: bool,
    pub paper_quote_balance: Decimal,
    pub paper_base_balance: Decimal,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            base_url: "https://api.mexc.com".to_string(),
            pair: "PIUSDT".to_string(),
            base_asset: "PI".to_string(),
            quote_asset: "USDT".to_string(),
            kline_interval: "1m".to_string(),
            kline_limit: 200,
            symbol_step_size: Decimal::new(1, 6),
            request_timeout_ms: 10_000,
            live_trading: false,
            paper_quote_balance: Decimal::from(1000),
            paper_base_balance: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub risk_fraction: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    /// Minimum order value in quote currency
    pub min_order_value: Decimal,
    /// Absolute size floor applied together with `min_order_value / price`
    pub min_order_quantity: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_fraction: Decimal::new(2, 2),
            stop_loss_pct: Decimal::new(2, 2),
            take_profit_pct: Decimal::new(5, 2),
            min_order_value: Decimal::from(5),
            min_order_quantity: Decimal::new(1, 2),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_slippage_fraction: Decimal,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl ExecutionConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_slippage_fraction: Decimal::new(1, 3),
            retry_attempts: 3,
            retry_base_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LearningConfig {
    pub enable_self_learning: bool,
    pub retrain_threshold_pct: f64,
    pub retrain_interval_predictions: u32,
    /// Cycles between acting on a prediction and scoring it
    pub evaluation_horizon_cycles: u64,
    pub max_outcomes: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enable_self_learning: true,
            retrain_threshold_pct: 55.0,
            retrain_interval_predictions: 500,
            evaluation_horizon_cycles: 5,
            max_outcomes: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdaptationConfig {
    pub enable_market_adaptation: bool,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    pub volatility_window: usize,
    pub momentum_period: usize,
    pub support_resistance_window: usize,
    /// Volatility band a new phase must clear before switching; 0 keeps strict thresholds
    pub hysteresis_margin: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            enable_market_adaptation: true,
            short_ma_period: 10,
            long_ma_period: 30,
            volatility_window: 20,
            momentum_period: 10,
            support_resistance_window: 20,
            hysteresis_margin: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_seconds: u64,
    /// Forced retrain evaluation every N executed trades; 0 disables
    pub retrain_every_trades: u32,
    pub degraded_after_failures: u32,
    pub state_file: String,
    pub profit_file: String,
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            retrain_every_trades: 100,
            degraded_after_failures: 3,
            state_file: "bot_state.json".to_string(),
            profit_file: "logs/profit.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_prefix: "trading.log".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub learning: LearningConfig,
    pub adaptation: AdaptationConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads `Settings.*` (optional) overridden by `APP__SECTION__KEY` env vars.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Settings")
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Message(msg.to_string()));

        if self.risk.risk_fraction <= Decimal::ZERO || self.risk.risk_fraction > Decimal::ONE {
            return fail("risk.risk_fraction must be in (0, 1]");
        }
        if self.risk.stop_loss_pct < Decimal::ZERO || self.risk.stop_loss_pct >= Decimal::ONE {
            return fail("risk.stop_loss_pct must be in [0, 1)");
        }
        if self.risk.take_profit_pct < Decimal::ZERO || self.risk.take_profit_pct >= Decimal::ONE {
            return fail("risk.take_profit_pct must be in [0, 1)");
        }
        if self.risk.min_order_value < Decimal::ZERO {
            return fail("risk.min_order_value must not be negative");
        }
        if self.execution.retry_attempts == 0 {
            return fail("execution.retry_attempts must be at least 1");
        }
        if self.execution.max_slippage_fraction < Decimal::ZERO {
            return fail("execution.max_slippage_fraction must not be negative");
        }
        if self.adaptation.short_ma_period == 0
            || self.adaptation.long_ma_period <= self.adaptation.short_ma_period
        {
            return fail("adaptation.long_ma_period must exceed a non-zero short_ma_period");
        }
        if self.adaptation.volatility_window < 2 {
            return fail("adaptation.volatility_window must be at least 2");
        }
        if self.adaptation.hysteresis_margin < 0.0 {
            return fail("adaptation.hysteresis_margin must not be negative");
        }
        // a shorter window could never hold enough outcomes to retrain
        if self.learning.max_outcomes > 0 && self.learning.max_outcomes < MIN_OUTCOMES_FOR_RETRAIN {
            return fail("learning.max_outcomes must be 0 (unbounded) or at least 20");
        }
        if self.engine.tick_interval_seconds == 0 {
            return fail("engine.tick_interval_seconds must be at least 1");
        }
        if self.exchange.base_asset == self.exchange.quote_asset {
            return fail("exchange.base_asset and quote_asset must differ");
        }
        Ok(())
    }
}
