//! Numeric field decoding for provider JSON.
//!
//! Providers send amounts as JSON numbers, decimal strings or
//! `__bigint__`-prefixed strings. Everything lands in `Decimal`.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::observation::FetchError;
use crate::domain::scaling::{parse_base_units, shift_decimals};

const BIGINT_PREFIX: &str = "__bigint__";

fn parse_text(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Decimal value of a JSON number or numeric string; `None` for null.
pub fn decimal_of(value: &Value) -> Result<Option<Decimal>, FetchError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => parse_text(&n.to_string())
            .map(Some)
            .ok_or_else(|| FetchError::Decode(format!("number {n} not representable"))),
        Value::String(s) => parse_text(s.strip_prefix(BIGINT_PREFIX).unwrap_or(s))
            .map(Some)
            .ok_or_else(|| FetchError::Decode(format!("'{s}' is not numeric"))),
        other => Err(FetchError::Decode(format!("expected a number, got {other}"))),
    }
}

/// Serde adapter for optional numeric fields.
pub fn opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    decimal_of(&value).map_err(serde::de::Error::custom)
}

/// Base-unit amount scaled by `decimals`.
///
/// `__bigint__` and digit strings go through exact integer scaling;
/// JSON numbers are divided in decimal arithmetic.
pub fn base_units_of(value: &Value, decimals: u32) -> Result<Option<Decimal>, FetchError> {
    if let Value::String(s) = value {
        let digits = s.strip_prefix(BIGINT_PREFIX).unwrap_or(s);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return parse_base_units(digits, decimals).map(Some);
        }
    }
    match decimal_of(value)? {
        None => Ok(None),
        Some(amount) => shift_decimals(amount, decimals)
            .map(Some)
            .ok_or_else(|| FetchError::Decode(format!("cannot scale {amount} by {decimals} decimals"))),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decimal_of_accepts_numbers_and_strings() {
        assert_eq!(decimal_of(&json!(0.0731)).unwrap(), Some(dec!(0.0731)));
        assert_eq!(decimal_of(&json!("1250.5")).unwrap(), Some(dec!(1250.5)));
        assert_eq!(decimal_of(&json!(null)).unwrap(), None);
        assert!(decimal_of(&json!({"x": 1})).is_err());
    }

    #[test]
    fn test_bigint_strings_scale_exactly() {
        let value = json!("__bigint__1500000000000000000000");
        assert_eq!(base_units_of(&value, 18).unwrap(), Some(dec!(1500)));
        assert_eq!(base_units_of(&json!(2_500_000), 6).unwrap(), Some(dec!(2.5)));
    }
}
