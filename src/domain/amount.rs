use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// A signed quantity of credits.
///
/// Used both for entry amounts (positive for credits, negative for debits)
/// and for balances, which are the sum of an account's entry amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A strictly positive quantity of credits.
///
/// Every operation that moves credits takes an `Amount`; the sign is decided
/// by the kind of entry being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value > Decimal::ZERO {
            Ok(Self(value.normalize()))
        } else {
            Err(LedgerError::Validation(format!(
                "Amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The entry amount for a credit of this size.
    pub fn credit(self) -> Balance {
        Balance(self.0)
    }

    /// The entry amount for a debit of this size.
    pub fn debit(self) -> Balance {
        Balance(-self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| LedgerError::Validation(format!("Invalid amount {s:?}: {e}")))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount.normalize())
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Whether this balance can absorb a debit of `amount` without going negative.
    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.normalize().fmt(f)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Balance {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Balance {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Balance::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
        assert_eq!(-b2, Balance::new(dec!(-5.0)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_signs() {
        let amount = Amount::new(dec!(300)).unwrap();
        assert_eq!(amount.credit(), Balance::new(dec!(300)));
        assert_eq!(amount.debit(), Balance::new(dec!(-300)));
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!("  250 ".parse::<Amount>().unwrap().value(), dec!(250));
        assert!("abc".parse::<Amount>().is_err());
        assert!("0".parse::<Amount>().is_err());
    }

    #[test]
    fn test_amount_rejects_non_positive_on_deserialize() {
        assert!(serde_json::from_str::<Amount>("\"12\"").is_ok());
        assert!(serde_json::from_str::<Amount>("\"-3\"").is_err());
    }

    #[test]
    fn test_balance_covers() {
        let balance = Balance::new(dec!(400));
        assert!(balance.covers(Amount::new(dec!(400)).unwrap()));
        assert!(!balance.covers(Amount::new(dec!(500)).unwrap()));
        assert!(Balance::new(dec!(-100)).is_negative());
        assert!(!Balance::ZERO.is_negative());
    }

    #[test]
    fn test_balance_sum() {
        let total: Balance = [dec!(1000), dec!(-300), dec!(-300)]
            .into_iter()
            .map(Balance::new)
            .sum();
        assert_eq!(total, Balance::new(dec!(400)));
    }
}
