// src/core/indicators.rs
//! Snapshot indicators: MA-crossover trend, return volatility, momentum and
//! support/resistance, all computed with `ta` streaming indicators.

use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use ta::indicators::{Maximum, Minimum, RateOfChange, SimpleMovingAverage, StandardDeviation};
use ta::Next;

use crate::config::AdaptationConfig;
use crate::error::IndicatorError;
use crate::types::{Candle, Indicators, MarketSnapshot, Trend};

/// Volatility reported when there is not enough history to measure it.
pub const DEFAULT_VOLATILITY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSettings {
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    pub volatility_window: usize,
    pub momentum_period: usize,
    pub support_resistance_window: usize,
}

impl From<&AdaptationConfig> for IndicatorSettings {
    fn from(config: &AdaptationConfig) -> Self {
        Self {
            short_ma_period: config.short_ma_period,
            long_ma_period: config.long_ma_period,
            volatility_window: config.volatility_window,
            momentum_period: config.momentum_period,
            support_resistance_window: config.support_resistance_window,
        }
    }
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self::from(&AdaptationConfig::default())
    }
}

fn closes_f64(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .filter_map(|c| c.close.to_f64())
        .collect()
}

/// Short vs long SMA crossover. Sideways when the long window is not filled yet.
pub fn detect_trend(closes: &[f64], short: usize, long: usize) -> Result<(Trend, f64), IndicatorError> {
    if closes.len() < long {
        return Ok((Trend::Sideways, 0.0));
    }
    let mut short_ma = SimpleMovingAverage::new(short)?;
    let mut long_ma = SimpleMovingAverage::new(long)?;
    let (mut s, mut l) = (0.0, 0.0);
    for &close in closes {
        s = short_ma.next(close);
        l = long_ma.next(close);
    }

    let strength = if l != 0.0 { (s - l) / l * 100.0 } else { 0.0 };
    let trend = if s > l {
        Trend::Bullish
    } else if s < l {
        Trend::Bearish
    } else {
        Trend::Sideways
    };
    Ok((trend, strength))
}

/// Standard deviation of percentage returns over the last `window` returns, in percent.
pub fn return_volatility(closes: &[f64], window: usize) -> Result<f64, IndicatorError> {
    if closes.len() < window + 1 {
        return Ok(DEFAULT_VOLATILITY);
    }
    let mut std_dev = StandardDeviation::new(window)?;
    let mut last = DEFAULT_VOLATILITY;
    for pair in closes.windows(2) {
        if pair[0] == 0.0 {
            continue;
        }
        let pct_return = (pair[1] - pair[0]) / pair[0] * 100.0;
        last = std_dev.next(pct_return);
    }
    Ok(last)
}

pub fn momentum(closes: &[f64], period: usize) -> Result<f64, IndicatorError> {
    if closes.len() <= period {
        return Ok(0.0);
    }
    let mut roc = RateOfChange::new(period)?;
    Ok(closes.iter().fold(0.0, |_, &close| roc.next(close)))
}

/// Rolling low of lows and high of highs over the last `window` candles.
pub fn support_resistance(candles: &[Candle], window: usize) -> Result<(Decimal, Decimal), IndicatorError> {
    if candles.is_empty() {
        return Ok((Decimal::ZERO, Decimal::ZERO));
    }
    let mut low = Minimum::new(window)?;
    let mut high = Maximum::new(window)?;
    let (mut support, mut resistance) = (0.0, 0.0);
    for candle in candles {
        support = low.next(candle.low.to_f64().unwrap_or_default());
        resistance = high.next(candle.high.to_f64().unwrap_or_default());
    }
    Ok((
        Decimal::from_f64(support).unwrap_or_default(),
        Decimal::from_f64(resistance).unwrap_or_default(),
    ))
}

pub fn compute(candles: &[Candle], settings: &IndicatorSettings) -> Result<Indicators, IndicatorError> {
    let closes = closes_f64(candles);
    let (trend, trend_strength) =
        detect_trend(&closes, settings.short_ma_period, settings.long_ma_period)?;
    let (support, resistance) = support_resistance(candles, settings.support_resistance_window)?;

    Ok(Indicators {
        trend,
        trend_strength,
        volatility: return_volatility(&closes, settings.volatility_window)?,
        momentum: momentum(&closes, settings.momentum_period)?,
        support,
        resistance,
    })
}

impl MarketSnapshot {
    /// Builds a snapshot, deriving indicators from the candles.
    pub fn from_candles(
        pair: impl Into<String>,
        candles: Vec<Candle>,
        settings: &IndicatorSettings,
    ) -> Result<Self, IndicatorError> {
        let indicators = compute(&candles, settings)?;
        Ok(Self {
            pair: pair.into(),
            candles,
            indicators,
            fetched_at: Utc::now(),
        })
    }

    /// Snapshot with caller-supplied indicators.
    pub fn with_indicators(pair: impl Into<String>, candles: Vec<Candle>, indicators: Indicators) -> Self {
        Self {
            pair: pair.into(),
            candles,
            indicators,
            fetched_at: Utc::now(),
        }
    }
}
