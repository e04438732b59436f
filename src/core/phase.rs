// src/core/phase.rs
use tracing::{debug, info};

use crate::config::AdaptationConfig;
use crate::types::{MarketSnapshot, StrategyPhase, Trend};

/// Regime table. Rules are checked in order; the first match wins.
pub fn classify_regime(volatility: f64, trend: Trend) -> StrategyPhase {
    if volatility < 0.5 && trend == Trend::Sideways {
        StrategyPhase::Scalping
    } else if volatility < 1.5 && trend.is_trending() {
        StrategyPhase::Swing
    } else if volatility >= 1.5 && trend == Trend::Sideways {
        StrategyPhase::Grid
    } else if volatility >= 2.0 && trend.is_trending() {
        StrategyPhase::Momentum
    } else {
        StrategyPhase::Scalping
    }
}

/// Tracks the active strategy phase across cycles.
pub struct PhaseAdapter {
    enabled: bool,
    hysteresis_margin: f64,
    current: StrategyPhase,
}

impl PhaseAdapter {
    pub fn new(config: &AdaptationConfig) -> Self {
        Self {
            enabled: config.enable_market_adaptation,
            hysteresis_margin: config.hysteresis_margin,
            current: StrategyPhase::Scalping,
        }
    }

    pub fn current(&self) -> StrategyPhase {
        self.current
    }

    /// Reinstates a persisted phase.
    pub fn restore(&mut self, phase: StrategyPhase) {
        self.current = phase;
    }

    pub fn classify(&self, snapshot: &MarketSnapshot) -> StrategyPhase {
        classify_regime(snapshot.indicators.volatility, snapshot.indicators.trend)
    }

    /// Re-evaluates the phase; returns the (possibly updated) current phase.
    pub fn adjust(&mut self, snapshot: &MarketSnapshot) -> StrategyPhase {
        if !self.enabled {
            return self.current;
        }

        let volatility = snapshot.indicators.volatility;
        let trend = snapshot.indicators.trend;
        let candidate = classify_regime(volatility, trend);
        if candidate == self.current {
            return self.current;
        }

        if self.hysteresis_margin > 0.0 {
            let low = classify_regime(volatility - self.hysteresis_margin, trend);
            let high = classify_regime(volatility + self.hysteresis_margin, trend);
            if low != candidate || high != candidate {
                debug!(
                    current = %self.current,
                    candidate = %candidate,
                    volatility,
                    "Phase change held back by hysteresis margin"
                );
                return self.current;
            }
        }

        info!(
            from = %self.current,
            to = %candidate,
            volatility,
            trend = ?trend,
            "Switching strategy phase"
        );
        self.current = candidate;
        self.current
    }
}
