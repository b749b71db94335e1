//! Type-safe price representation using decimal arithmetic.
//!
//! All prices held client-side are in the currency's *major* unit (dollars,
//! euros), never in minor units (cents). Values arriving in minor units must
//! go through [`Price::from_minor_units`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price from an amount expressed in minor units.
    ///
    /// Zero-decimal currencies (JPY) are returned unchanged.
    #[must_use]
    pub fn from_minor_units(minor: i64, currency_code: CurrencyCode) -> Self {
        let amount = Decimal::new(minor, currency_code.minor_digits());
        Self {
            amount,
            currency_code,
        }
    }

    /// Multiply by a quantity, e.g. for an optimistic line subtotal.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self {
            amount: self.amount * Decimal::from(quantity),
            currency_code: self.currency_code,
        }
    }
}

/// ISO 4217 currency codes offered by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    CHF,
    JPY,
}

impl CurrencyCode {
    /// Number of minor-unit digits (2 for cents, 0 for yen).
    #[must_use]
    pub const fn minor_digits(self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    /// Upper-case ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
            Self::CHF => "CHF",
            Self::JPY => "JPY",
        }
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    /// Backend payloads carry lower-case codes (`"usd"`), so parsing is
    /// case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            "CHF" => Ok(Self::CHF),
            "JPY" => Ok(Self::JPY),
            _ => Err(format!("unsupported currency code: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor_units() {
        let price = Price::from_minor_units(24_500, CurrencyCode::USD);
        assert_eq!(price.amount, Decimal::new(245, 0));

        let yen = Price::from_minor_units(24_500, CurrencyCode::JPY);
        assert_eq!(yen.amount, Decimal::new(24_500, 0));
    }

    #[test]
    fn test_times() {
        let price = Price::new(Decimal::new(1250, 2), CurrencyCode::EUR);
        assert_eq!(price.times(3).amount, Decimal::new(3750, 2));
    }

    #[test]
    fn test_currency_parse_is_case_insensitive() {
        assert_eq!("usd".parse::<CurrencyCode>().unwrap(), CurrencyCode::USD);
        assert_eq!("Chf".parse::<CurrencyCode>().unwrap(), CurrencyCode::CHF);
        assert!("xyz".parse::<CurrencyCode>().is_err());
    }
}
