use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A signed EUR amount. Positive values are inbound money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).round().to_i64().unwrap_or(0)
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Equality within one cent. Statement exports round inconsistently,
    /// so exact Decimal comparison is too strict at the import boundary.
    pub fn approx_eq(self, other: Money) -> bool {
        (self - other).abs() <= Money::from_cents(1)
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} €", self.0)
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

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(123456).to_cents(), 123456);
        assert_eq!(Money::from_cents(-75025).to_cents(), -75025);
    }

    #[test]
    fn approx_eq_within_one_cent() {
        assert!(Money::from_cents(75000).approx_eq(Money::from_cents(75001)));
        assert!(!Money::from_cents(75000).approx_eq(Money::from_cents(75002)));
    }

    #[test]
    fn abs_and_sign() {
        assert_eq!(Money::from_cents(-500).abs(), Money::from_cents(500));
        assert!(Money::from_cents(1).is_positive());
        assert!(!Money::from_cents(-1).is_positive());
        assert!(!Money::zero().is_positive());
    }

    #[test]
    fn display_eur() {
        assert_eq!(Money::from_cents(123456).to_string(), "1234.56 €");
    }
}
