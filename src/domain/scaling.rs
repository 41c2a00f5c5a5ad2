//! Decimal scaling between base-unit integers and human units.
//!
//! Token amounts arrive as integers in base units (6, 8 or 18 decimals).
//! `from_base_units` produces the exact decimal `raw / 10^decimals`;
//! `to_base_units` inverts it, rounding half-to-even when the value
//! carries more fractional digits than the token declares.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

use super::observation::FetchError;

/// Largest decimal count a `Decimal` can represent exactly.
pub const MAX_DECIMALS: u32 = 28;

/// Scale a base-unit integer to a decimal value.
///
/// Fails with `FetchError::Decode` when the integer does not fit the
/// 96-bit decimal mantissa or `decimals` exceeds [`MAX_DECIMALS`].
pub fn from_base_units(raw: u128, decimals: u32) -> Result<Decimal, FetchError> {
    if decimals > MAX_DECIMALS {
        return Err(FetchError::Decode(format!(
            "{decimals} decimals exceeds supported maximum of {MAX_DECIMALS}"
        )));
    }
    let signed = i128::try_from(raw)
        .map_err(|_| FetchError::Decode(format!("value {raw} out of range")))?;
    Decimal::try_from_i128_with_scale(signed, decimals)
        .map_err(|e| FetchError::Decode(format!("value {raw} not representable: {e}")))
}

/// Scale a decimal value back to base units.
///
/// Returns `None` for negative values or when the result overflows.
pub fn to_base_units(value: Decimal, decimals: u32) -> Option<u128> {
    if value.is_sign_negative() || decimals > MAX_DECIMALS {
        return None;
    }
    let mut rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(decimals);
    if rounded.scale() != decimals {
        return None;
    }
    u128::try_from(rounded.mantissa()).ok()
}

/// Parse a base-unit integer carried as text (decimal digits only).
pub fn parse_base_units(text: &str, decimals: u32) -> Result<Decimal, FetchError> {
    let raw: u128 = text
        .trim()
        .parse()
        .map_err(|_| FetchError::Decode(format!("'{text}' is not a base-unit integer")))?;
    from_base_units(raw, decimals)
}

/// Scale an already-decimal amount expressed in base units.
///
/// Providers sometimes report base units as JSON numbers; dividing keeps
/// whatever precision survived transport.
pub fn shift_decimals(value: Decimal, decimals: u32) -> Option<Decimal> {
    value.checked_div(pow10(decimals)?)
}

/// Convert a fraction (0.25) to percentage points (25).
///
/// Returns `None` when the percentage does not fit a `Decimal`.
pub fn fraction_to_percent(fraction: Decimal) -> Option<Decimal> {
    fraction.checked_mul(dec!(100))
}

/// Sum of `values`, or `None` on overflow.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// `numerator / denominator * 100`, or `None` when the denominator is zero.
pub fn ratio_percent(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        return None;
    }
    numerator
        .checked_div(denominator)
        .and_then(|r| r.checked_mul(dec!(100)))
}

fn pow10(exp: u32) -> Option<Decimal> {
    let mut out = Decimal::ONE;
    for _ in 0..exp {
        out = out.checked_mul(Decimal::TEN)?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_common_decimals() {
        assert_eq!(from_base_units(1_500_000, 6).unwrap(), dec!(1.5));
        assert_eq!(from_base_units(250_000_000, 8).unwrap(), dec!(2.5));
        assert_eq!(
            from_base_units(1_000_000_000_000_000_000_000_000, 18).unwrap(),
            dec!(1000000)
        );
    }

    #[test]
    fn test_round_trip_is_exact() {
        let raw = 123_456_789_012_345_678_901_u128;
        let value = from_base_units(raw, 18).unwrap();
        assert_eq!(to_base_units(value, 18), Some(raw));
        assert_eq!(to_base_units(value.normalize(), 18), Some(raw));
    }

    #[test]
    fn test_rescale_uses_bankers_rounding() {
        assert_eq!(to_base_units(dec!(0.0000025), 6), Some(2));
        assert_eq!(to_base_units(dec!(0.0000035), 6), Some(4));
    }

    #[test]
    fn test_out_of_range_is_decode_error() {
        assert!(matches!(from_base_units(u128::MAX, 18), Err(FetchError::Decode(_))));
        assert!(matches!(from_base_units(1, 29), Err(FetchError::Decode(_))));
        assert!(matches!(parse_base_units("12x", 6), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_ratio_percent() {
        assert_eq!(ratio_percent(dec!(250000), dec!(1000000)), Some(dec!(25)));
        assert_eq!(ratio_percent(dec!(1), Decimal::ZERO), None);
        assert_eq!(fraction_to_percent(dec!(0.0731)), Some(dec!(7.31)));
    }

    #[test]
    fn test_out_of_range_fraction_is_none() {
        let huge: Decimal = "70000000000000000000000000000".parse().unwrap();
        assert_eq!(fraction_to_percent(huge), None);
        assert_eq!(fraction_to_percent(Decimal::MAX), None);
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum([dec!(1.5), dec!(2.5)]), Some(dec!(4)));
        assert_eq!(checked_sum(Vec::new()), Some(Decimal::ZERO));
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), None);
    }

    #[test]
    fn test_shift_decimals() {
        assert_eq!(shift_decimals(dec!(2500000), 6), Some(dec!(2.5)));
    }
}
