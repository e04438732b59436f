// src/utils/precision.rs
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept on every sizing output.
pub const SIZING_DP: u32 = 6;

/// Rounds DOWN to the nearest multiple of step_size.
/// Example: amount=10.999, step=1.0 -> 10.0
pub fn normalize_quantity(amount: Decimal, step_size: Decimal) -> Decimal {
    if step_size.is_zero() {
        return amount;
    }
    (amount / step_size).floor() * step_size
}

/// Fixed-precision rounding used for deterministic sizing.
pub fn round_fixed(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SIZING_DP, RoundingStrategy::MidpointNearestEven)
}

/// Same precision, rounded toward +inf. Used for minimum floors so the floor itself
/// never lands below the limit it encodes.
pub fn round_fixed_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SIZING_DP, RoundingStrategy::ToPositiveInfinity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantity_is_floored_to_step() {
        assert_eq!(normalize_quantity(dec!(10.999), dec!(1.0)), dec!(10));
        assert_eq!(normalize_quantity(dec!(0.1234567), dec!(0.001)), dec!(0.123));
        assert_eq!(normalize_quantity(dec!(3.3), Decimal::ZERO), dec!(3.3));
    }

    #[test]
    fn fixed_rounding_keeps_six_places() {
        assert_eq!(round_fixed(dec!(0.39999999)), dec!(0.4));
        assert_eq!(round_fixed(dec!(1.2345674)), dec!(1.234567));
    }

    #[test]
    fn floor_rounding_never_drops_below_limit() {
        let floor = round_fixed_up(dec!(5) / dec!(6));
        assert_eq!(floor, dec!(0.833334));
        assert!(floor * dec!(6) >= dec!(5));
    }
}
