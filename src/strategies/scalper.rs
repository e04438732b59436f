use crate::error::SignalError;
use crate::strategies::traits::SignalProvider;
use crate::types::{MarketSnapshot, TradeSignal};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use ta::indicators::SimpleMovingAverage;
use ta::Next;
use tracing::{debug, info};

/// Threshold bounds used when retraining recalibrates the bands.
const MIN_BAND_PCT: f64 = 0.002;
const MAX_BAND_PCT: f64 = 0.05;

/// Dip-buying / spike-selling around a moving baseline.
pub struct SimpleScalper {
    lookback: usize,
    target_drop_pct: f64,
    target_profit_pct: f64,
    /// Volatility (percent) of the last snapshot seen; retraining scales the bands by it.
    last_volatility: Option<f64>,
}

impl SimpleScalper {
    /// Creates a new SimpleScalper.
    ///
    /// # Arguments
    /// * `lookback` - Candles averaged into the baseline price.
    /// * `target_drop_pct` - Drop below baseline that triggers a BUY (e.g., 0.02 for 2%).
    /// * `target_profit_pct` - Rise above baseline that triggers a SELL (e.g., 0.03 for 3%).
    pub fn new(lookback: usize, target_drop_pct: f64, target_profit_pct: f64) -> Self {
        Self {
            lookback: lookback.max(1),
            target_drop_pct,
            target_profit_pct,
            last_volatility: None,
        }
    }

    pub fn bands(&self) -> (f64, f64) {
        (self.target_drop_pct, self.target_profit_pct)
    }
}

#[async_trait]
impl SignalProvider for SimpleScalper {
    fn name(&self) -> String {
        format!("scalper(lookback={})", self.lookback)
    }

    async fn generate_signal(&mut self, snapshot: &MarketSnapshot) -> Result<TradeSignal, SignalError> {
        if snapshot.candles.len() < self.lookback {
            return Err(SignalError::ModelUnavailable(format!(
                "need {} candles, have {}",
                self.lookback,
                snapshot.candles.len()
            )));
        }

        let mut sma = SimpleMovingAverage::new(self.lookback)
            .map_err(|e| SignalError::ModelUnavailable(format!("{:?}", e)))?;
        let mut baseline = 0.0;
        for close in snapshot.closes() {
            baseline = sma.next(close.to_f64().unwrap_or_default());
        }
        let price = snapshot
            .latest_price()
            .and_then(|p| p.to_f64())
            .ok_or_else(|| SignalError::ModelUnavailable("no price".to_string()))?;

        self.last_volatility = Some(snapshot.indicators.volatility);

        let buy_target = baseline * (1.0 - self.target_drop_pct);
        let sell_target = baseline * (1.0 + self.target_profit_pct);
        debug!(price, baseline, buy_target, sell_target, "Scalper levels");

        if price <= buy_target {
            Ok(TradeSignal::Buy)
        } else if price >= sell_target {
            Ok(TradeSignal::Sell)
        } else {
            Ok(TradeSignal::Hold)
        }
    }

    async fn retrain(&mut self) -> Result<(), SignalError> {
        let volatility = self
            .last_volatility
            .ok_or_else(|| SignalError::TrainingFailed("no market data seen yet".to_string()))?;

        // One standard deviation of returns on each side of the baseline.
        let band = (volatility / 100.0).clamp(MIN_BAND_PCT, MAX_BAND_PCT);
        info!(
            old_drop = self.target_drop_pct,
            old_profit = self.target_profit_pct,
            new_band = band,
            "Scalper bands recalibrated"
        );
        self.target_drop_pct = band;
        self.target_profit_pct = band;
        Ok(())
    }
}
