//! The credit bundles offered at checkout.

use super::amount::Amount;
use crate::error::Result;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPackage {
    pub name: &'static str,
    pub credits: u32,
    /// Price in the smallest currency unit (USD cents).
    pub price_cents: u32,
}

impl CreditPackage {
    pub fn amount(&self) -> Result<Amount> {
        Amount::new(Decimal::from(self.credits))
    }
}

pub const PACKAGES: [CreditPackage; 3] = [
    CreditPackage {
        name: "basic",
        credits: 600,
        price_cents: 999,
    },
    CreditPackage {
        name: "premium",
        credits: 2000,
        price_cents: 2999,
    },
    CreditPackage {
        name: "pro",
        credits: 5000,
        price_cents: 5999,
    },
];

pub fn package(name: &str) -> Option<&'static CreditPackage> {
    PACKAGES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// The package sold at `price_cents`, used to cross-check what a checkout paid for.
pub fn package_for_price(price_cents: u32) -> Option<&'static CreditPackage> {
    PACKAGES.iter().find(|p| p.price_cents == price_cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_lookup() {
        assert_eq!(package("premium").map(|p| p.credits), Some(2000));
        assert_eq!(package("PRO").map(|p| p.price_cents), Some(5999));
        assert!(package("enterprise").is_none());
        assert_eq!(package("basic").unwrap().amount().unwrap().value(), Decimal::from(600));
    }

    #[test]
    fn test_package_for_price() {
        assert_eq!(package_for_price(999).map(|p| p.name), Some("basic"));
        assert!(package_for_price(1).is_none());
    }
}
