use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn from_major(units: i64) -> Self {
        Money(Decimal::from(units))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).round().to_i64().unwrap_or_default()
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Scales by `factor`, keeping full precision so band edges are exact.
    pub fn scale(self, factor: Decimal) -> Self {
        Money(self.0 * factor)
    }

    /// `[self * (1 - fraction), self * (1 + fraction)]`, ordered low to high.
    pub fn band(self, fraction: Decimal) -> (Money, Money) {
        let a = self.scale(Decimal::ONE - fraction);
        let b = self.scale(Decimal::ONE + fraction);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            write!(f, "-${:.2}", self.0.abs())
        } else {
            write!(f, "${:.2}", self.0)
        }
    }
}

impl FromStr for Money {
    type Err = CoreError;

    /// Accepts `1,234.50`, `$99`, `-12.00` and accounting-style `(45.00)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, body) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
            (true, &trimmed[1..trimmed.len() - 1])
        } else {
            (false, trimmed)
        };
        let cleaned = body.replace([',', '$', ' '], "");
        let mut dec =
            Decimal::from_str(&cleaned).map_err(|_| CoreError::InvalidAmount(s.to_string()))?;
        if negative {
            dec = -dec;
        }
        Ok(Money::from_decimal(dec))
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fifth() -> Decimal {
        Decimal::new(2, 1)
    }

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(12345).to_cents(), 12345);
        assert_eq!(Money::from_cents(-50).to_cents(), -50);
    }

    #[test]
    fn parse_plain_and_decorated() {
        assert_eq!("123.45".parse::<Money>().unwrap().to_cents(), 12345);
        assert_eq!("$1,234.50".parse::<Money>().unwrap().to_cents(), 123450);
        assert_eq!("(45.00)".parse::<Money>().unwrap().to_cents(), -4500);
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn band_is_twenty_percent_each_side() {
        let (lo, hi) = Money::from_major(100).band(fifth());
        assert_eq!(lo, Money::from_major(80));
        assert_eq!(hi, Money::from_major(120));
    }

    #[test]
    fn band_stays_ordered_for_negative_amounts() {
        let (lo, hi) = Money::from_major(-100).band(fifth());
        assert!(lo <= hi);
        assert_eq!(lo, Money::from_major(-120));
    }

    #[test]
    fn display_formats_sign() {
        assert_eq!(Money::from_cents(550).to_string(), "$5.50");
        assert_eq!(Money::from_cents(-7500).to_string(), "-$75.00");
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [100, 250, 5].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.to_cents(), 355);
    }
}
