// src/core/risk.rs
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::types::{Balance, MarketSnapshot, Side, TradeDecision, TradeSignal};
use crate::utils::precision::{round_fixed, round_fixed_up};

/// Keeps the volatility factor finite when volatility is zero.
const VOLATILITY_EPSILON: f64 = 1e-9;
const MIN_VOLATILITY_FACTOR: f64 = 0.5;
const MAX_VOLATILITY_FACTOR: f64 = 2.0;

/// Stop-loss and take-profit for an entry. Pure: no market lookups.
pub fn risk_levels(
    entry_price: Decimal,
    side: Side,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
) -> (Decimal, Decimal) {
    let (stop_loss, take_profit) = match side {
        Side::Buy => (
            entry_price * (Decimal::ONE - stop_loss_pct),
            entry_price * (Decimal::ONE + take_profit_pct),
        ),
        Side::Sell => (
            entry_price * (Decimal::ONE + stop_loss_pct),
            entry_price * (Decimal::ONE - take_profit_pct),
        ),
    };
    (round_fixed(stop_loss), round_fixed(take_profit))
}

/// `clamp(1 / (volatility + eps), 0.5, 2.0)`: calm markets grow size, wild ones shrink it.
pub fn volatility_factor(volatility: f64) -> f64 {
    let volatility = if volatility.is_finite() { volatility.max(0.0) } else { 0.0 };
    (1.0 / (volatility + VOLATILITY_EPSILON)).clamp(MIN_VOLATILITY_FACTOR, MAX_VOLATILITY_FACTOR)
}

/// Turns a signal into a sized, validated decision.
pub struct RiskSizer {
    config: RiskConfig,
    base_asset: String,
    quote_asset: String,
}

impl RiskSizer {
    pub fn new(config: &RiskConfig, base_asset: impl Into<String>, quote_asset: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
        }
    }

    pub fn evaluate(&self, signal: TradeSignal, snapshot: &MarketSnapshot, balance: &Balance) -> TradeDecision {
        let side = match signal.side() {
            Some(side) => side,
            None => return TradeDecision::rejected("invalid signal"),
        };

        // every check below uses the price the decision will carry
        let price = match snapshot.latest_price().map(round_fixed) {
            Some(p) if p > Decimal::ZERO => p,
            _ => return TradeDecision::rejected("no market price"),
        };

        let quote = balance.get(&self.quote_asset);
        let base = balance.get(&self.base_asset);

        let raw_size = match side {
            Side::Buy => {
                if quote < price {
                    warn!(quote = %quote, price = %price, "Trade not valid: not enough {} to buy", self.quote_asset);
                    return TradeDecision::rejected(format!("not enough {} to buy", self.quote_asset));
                }
                self.config.risk_fraction * quote / price
            }
            Side::Sell => {
                if base <= Decimal::ZERO {
                    warn!("Trade not valid: not enough {} to sell", self.base_asset);
                    return TradeDecision::rejected(format!("not enough {} to sell", self.base_asset));
                }
                self.config.risk_fraction * base
            }
        };

        let factor = volatility_factor(snapshot.indicators.volatility);
        let scaled = raw_size * Decimal::from_f64(factor).unwrap_or(Decimal::ONE);
        let mut position_size = round_fixed(scaled);
        debug!(
            raw = %raw_size,
            factor,
            sized = %position_size,
            "Volatility-scaled position size"
        );

        let floor = round_fixed_up((self.config.min_order_value / price).max(self.config.min_order_quantity));
        if position_size < floor {
            warn!(
                size = %position_size,
                floor = %floor,
                "Trade size too small, adjusting to exchange minimum"
            );
            position_size = floor;
        }

        let (stop_loss, take_profit) = risk_levels(
            price,
            side,
            self.config.stop_loss_pct,
            self.config.take_profit_pct,
        );
        let decision = TradeDecision {
            valid: true,
            reason: None,
            side: Some(side),
            position_size,
            entry_price: price,
            stop_loss,
            take_profit,
        };

        if decision.notional() < self.config.min_order_value {
            warn!(
                notional = %decision.notional(),
                min = %self.config.min_order_value,
                "Trade size below exchange minimum order value"
            );
            return TradeDecision::rejected("size below exchange minimum");
        }

        let affordable = match side {
            Side::Buy => decision.notional() <= quote,
            Side::Sell => position_size <= base,
        };
        if !affordable {
            warn!(size = %position_size, "Trade not valid: balance cannot fund the minimum order");
            return TradeDecision::rejected("insufficient balance");
        }

        info!(
            side = %side,
            size = %position_size,
            entry = %price,
            stop_loss = %stop_loss,
            take_profit = %take_profit,
            volatility = snapshot.indicators.volatility,
            "Trade validated"
        );

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candle, Indicators};
    use rust_decimal_macros::dec;

    fn snapshot(price: Decimal, volatility: f64) -> MarketSnapshot {
        let candle = Candle {
            open_time: 0,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: dec!(1),
        };
        MarketSnapshot::with_indicators(
            "PIUSDT",
            vec![candle],
            Indicators {
                volatility,
                ..Indicators::default()
            },
        )
    }

    fn sizer() -> RiskSizer {
        RiskSizer::new(&RiskConfig::default(), "PI", "USDT")
    }

    fn balance(usdt: Decimal, pi: Decimal) -> Balance {
        Balance::new().with("USDT", usdt).with("PI", pi)
    }

    #[test]
    fn risk_levels_for_both_sides() {
        assert_eq!(
            risk_levels(dec!(100), Side::Buy, dec!(0.02), dec!(0.05)),
            (dec!(98.0), dec!(105.0))
        );
        assert_eq!(
            risk_levels(dec!(100), Side::Sell, dec!(0.02), dec!(0.05)),
            (dec!(102.0), dec!(95.0))
        );
    }

    #[test]
    fn neutral_volatility_sizes_by_risk_fraction() {
        let decision = sizer().evaluate(TradeSignal::Buy, &snapshot(dec!(50), 1.0), &balance(dec!(1000), dec!(2)));
        assert!(decision.valid);
        assert_eq!(decision.position_size, dec!(0.4));
        assert_eq!(decision.entry_price, dec!(50));
        assert_eq!(decision.stop_loss, dec!(49));
        assert_eq!(decision.take_profit, dec!(52.5));
    }

    #[test]
    fn hold_is_an_invalid_signal() {
        let decision = sizer().evaluate(TradeSignal::Hold, &snapshot(dec!(50), 1.0), &balance(dec!(1000), dec!(2)));
        assert!(!decision.valid);
        assert_eq!(decision.reason.as_deref(), Some("invalid signal"));
    }

    #[test]
    fn buy_needs_at_least_one_unit_of_quote() {
        let decision = sizer().evaluate(TradeSignal::Buy, &snapshot(dec!(50), 1.0), &balance(dec!(49), dec!(2)));
        assert!(!decision.valid);
    }

    #[test]
    fn sell_needs_base_inventory() {
        let decision = sizer().evaluate(TradeSignal::Sell, &snapshot(dec!(50), 1.0), &balance(dec!(1000), dec!(0)));
        assert!(!decision.valid);
    }

    #[test]
    fn volatility_factor_is_clamped() {
        assert_eq!(volatility_factor(0.0), 2.0);
        assert_eq!(volatility_factor(10.0), 0.5);
        assert!((volatility_factor(1.0) - 1.0).abs() < 1e-6);
        assert_eq!(volatility_factor(f64::NAN), 2.0);
    }

    #[test]
    fn high_volatility_halves_size() {
        let decision = sizer().evaluate(TradeSignal::Buy, &snapshot(dec!(50), 4.0), &balance(dec!(10000), dec!(0)));
        assert!(decision.valid);
        assert_eq!(decision.position_size, dec!(2));
    }

    #[test]
    fn small_size_is_raised_to_the_floor() {
        // 2% of 1 PI at 50 is 1 USDT; floored to 5 / 50 = 0.1 PI
        let decision = sizer().evaluate(TradeSignal::Sell, &snapshot(dec!(50), 1.0), &balance(dec!(0), dec!(1)));
        assert!(decision.valid);
        assert_eq!(decision.position_size, dec!(0.1));
        assert_eq!(decision.stop_loss, dec!(51));
        assert_eq!(decision.take_profit, dec!(47.5));
    }

    #[test]
    fn unfundable_floor_is_rejected() {
        // floor is 5 PI at price 1, only 3 PI available
        let decision = sizer().evaluate(TradeSignal::Sell, &snapshot(dec!(1), 1.0), &balance(dec!(0), dec!(3)));
        assert!(!decision.valid);
        assert_eq!(decision.reason.as_deref(), Some("insufficient balance"));
    }

    #[test]
    fn sub_micro_price_digits_are_dropped_before_sizing() {
        let decision = sizer().evaluate(TradeSignal::Buy, &snapshot(dec!(0.0100004), 1.0), &balance(dec!(100), dec!(0)));
        assert!(decision.valid);
        assert_eq!(decision.entry_price, dec!(0.01));
        assert_eq!(decision.position_size, dec!(500));
        assert!(decision.notional() >= dec!(5));
    }

    #[test]
    fn valid_decisions_always_meet_min_order_value() {
        let sizer = sizer();
        let min = RiskConfig::default().min_order_value;
        let prices = [dec!(0.003), dec!(0.0100004), dec!(0.7), dec!(1.2345678), dec!(1), dec!(6), dec!(7.3), dec!(50), dec!(999.99), dec!(43210.5)];
        let balances = [dec!(1), dec!(5), dec!(12.5), dec!(100), dec!(1000), dec!(250000)];
        let vols = [0.0, 0.3, 1.0, 2.7, 9.0];

        for &price in &prices {
            for &amount in &balances {
                for &vol in &vols {
                    let snap = snapshot(price, vol);
                    for signal in [TradeSignal::Buy, TradeSignal::Sell] {
                        let d = sizer.evaluate(signal, &snap, &balance(amount, amount));
                        if d.valid {
                            assert!(
                                d.position_size * d.entry_price >= min,
                                "price={} balance={} vol={} size={}",
                                price,
                                amount,
                                vol,
                                d.position_size
                            );
                        }
                    }
                }
            }
        }
    }
}
