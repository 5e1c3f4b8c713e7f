//! Decimal prices read from loosely typed record fields.
//!
//! Product prices are entered through free-form inputs, so the stored value may
//! be a JSON number, a numeric string, an empty string or missing entirely.
//! [`Price`] normalizes all of these to a [`Decimal`] so aggregates such as
//! "amount = price x quantity" never go through floating point.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A non-currency-tagged decimal amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Read a price from a record field value.
    ///
    /// Numbers and numeric strings (optionally with thousands separators) are
    /// accepted; anything else, including blank strings, yields `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(Decimal::from(i)))
                } else {
                    Decimal::from_str(&n.to_string()).ok().map(Self)
                }
            }
            Value::String(s) => Self::parse_lenient(s),
            _ => None,
        }
    }

    /// Like [`Price::from_value`], but missing or unreadable values count as zero.
    #[must_use]
    pub fn from_value_or_zero(value: Option<&Value>) -> Self {
        value.and_then(Self::from_value).unwrap_or(Self::ZERO)
    }

    /// Parse a human-entered amount such as `"1,250.50"`.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
        if cleaned.is_empty() {
            return None;
        }
        Decimal::from_str(&cleaned).ok().map(Self)
    }

    /// `self + rhs`, clamped to the decimal range.
    #[must_use]
    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// `self * factor`, clamped to the decimal range.
    ///
    /// Stored prices are free-form, so a value near [`Decimal::MAX`] times a
    /// quantity must not overflow.
    #[must_use]
    pub fn saturating_mul(self, factor: Decimal) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl core::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_number() {
        assert_eq!(
            Price::from_value(&json!(12)).unwrap().amount(),
            Decimal::from(12)
        );
        assert_eq!(
            Price::from_value(&json!(12.5)).unwrap().amount(),
            Decimal::new(125, 1)
        );
    }

    #[test]
    fn test_from_value_string() {
        assert_eq!(
            Price::from_value(&json!(" 1,250.50 ")).unwrap().amount(),
            Decimal::new(125_050, 2)
        );
        assert_eq!(Price::from_value(&json!("")), None);
        assert_eq!(Price::from_value(&json!("n/a")), None);
        assert_eq!(Price::from_value(&json!(null)), None);
    }

    #[test]
    fn test_from_value_or_zero() {
        assert_eq!(Price::from_value_or_zero(None), Price::ZERO);
        assert_eq!(Price::from_value_or_zero(Some(&json!("x"))), Price::ZERO);
    }

    #[test]
    fn test_amount_arithmetic() {
        let total: Price = [
            Price::parse_lenient("10.25").unwrap().saturating_mul(Decimal::from(4)),
            Price::parse_lenient("3").unwrap().saturating_mul(Decimal::from(2)),
        ]
        .into_iter()
        .sum();
        assert_eq!(total.amount(), Decimal::from(47));
        assert_eq!(total.to_string(), "47");
    }

    #[test]
    fn test_arithmetic_saturates() {
        let huge = Price::parse_lenient("50000000000000000000000000000").unwrap();
        assert_eq!(huge.saturating_mul(Decimal::from(2)).amount(), Decimal::MAX);
        assert_eq!(huge.saturating_add(huge).amount(), Decimal::MAX);

        let total: Price = [huge, huge, Price::parse_lenient("1").unwrap()].into_iter().sum();
        assert_eq!(total.amount(), Decimal::MAX);
    }
}
