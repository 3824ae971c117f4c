//! Money - amount + currency pair used throughout the ledger
//!
//! All bank notification amounts are carried as `rust_decimal::Decimal` to
//! avoid float rounding on money. Display formatting is centralized here so
//! push notification bodies render consistently (e.g. "$2.20").

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Money conversion/validation errors
#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

/// Currency of a ledger amount
///
/// The partner bank sends lowercase ISO codes ("usd"). Only USD is settled
/// today; the enum keeps the door open without stringly-typed checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    Usd,
}

impl Currency {
    /// Currency symbol for human-facing formatting
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "usd",
        }
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Currency::Usd),
            other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Amount + currency, the unit every ledger row and activity message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// USD convenience constructor (the only settled currency today)
    pub fn usd(amount: Decimal) -> Self {
        Self {
            amount,
            currency: Currency::Usd,
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Absolute value; bank notifications carry signed amounts for debits
    pub fn abs(&self) -> Self {
        Self {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    /// Human-facing rendering with two decimal places: "$2.20"
    ///
    /// Negative amounts render as "-$4.50" (sign before the symbol), which is
    /// what the notification templates expect.
    pub fn display(&self) -> String {
        // Cash rounding: midpoints go away from zero, not to even
        let rounded = self
            .amount
            .abs()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if self.amount.is_sign_negative() {
            format!("-{}{:.2}", self.currency.symbol(), rounded)
        } else {
            format!("{}{:.2}", self.currency.symbol(), rounded)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}
