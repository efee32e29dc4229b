//! Decimal currency amounts.

use std::iter::Sum;
use std::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monetary amount in the business's single billing currency.
///
/// Backed by [`Decimal`] so sums over invoices never accumulate float error.
/// Deserializes from either a JSON number or a decimal string, which is how
/// `numeric` columns arrive from the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount from a decimal value.
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Create an amount from minor units (e.g. paise or cents).
    #[must_use]
    pub fn from_minor(units: i64) -> Self {
        Self(Decimal::new(units, 2))
    }

    /// The underlying decimal value.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Amount {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_from_minor() {
        assert_eq!(Amount::from_minor(123_45).to_string(), "123.45");
        assert_eq!(Amount::from_minor(-5).to_string(), "-0.05");
    }

    #[test]
    fn test_sum_is_exact() {
        let total: Amount = [Amount::from_minor(10), Amount::from_minor(20)]
            .iter()
            .sum();
        assert_eq!(total, Amount::new(Decimal::from_str("0.30").unwrap()));
    }

    #[test]
    fn test_deserialize_number_or_string() {
        let from_number: Amount = serde_json::from_str("499.5").unwrap();
        let from_string: Amount = serde_json::from_str("\"499.50\"").unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_string.to_string(), "499.50");
    }
}
