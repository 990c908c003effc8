use crate::error::CartError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul};

/// A non-negative monetary value.
///
/// Wraps `rust_decimal::Decimal` so prices and totals never go through
/// floating point and can never be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, CartError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(CartError::ValidationError(
                "Price must not be negative".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Money {
    type Error = CartError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// Unit price times quantity.
impl Mul<u32> for Money {
    type Output = Self;
    fn mul(self, quantity: u32) -> Self::Output {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_validation() {
        assert!(Money::new(dec!(0)).is_ok());
        assert!(Money::new(dec!(2.50)).is_ok());
        assert!(matches!(
            Money::new(dec!(-0.01)),
            Err(CartError::ValidationError(_))
        ));
    }

    #[test]
    fn test_money_arithmetic() {
        let price = Money::new(dec!(2.50)).unwrap();
        assert_eq!(price * 3, Money::new(dec!(7.50)).unwrap());
        let total: Money = [price, price * 2].into_iter().sum();
        assert_eq!(total.value(), dec!(7.50));
        assert_eq!(total.to_string(), "7.50");
    }

    #[test]
    fn test_negative_money_rejected_on_deserialize() {
        assert!(serde_json::from_str::<Money>("\"-1.0\"").is_err());
        let money: Money = serde_json::from_str("\"3.99\"").unwrap();
        assert_eq!(money.value(), dec!(3.99));
    }
}
