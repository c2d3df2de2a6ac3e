//! Type-safe price representation using decimal arithmetic.
//!
//! The shop trades in a single currency, so a price is just a non-negative
//! `Decimal` amount in dollars. Display is always `$` with two places.
//!
//! Unit prices are capped at [`Price::MAX`]. Subtotals and totals use checked
//! arithmetic and saturate instead of overflowing.

use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a price is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price must not be negative (got {0})")]
    Negative(Decimal),
    #[error("price is not a finite number")]
    NotFinite,
    #[error("price {0} exceeds the $1,000,000.00 limit")]
    TooLarge(String),
    #[error("invalid price {0:?}")]
    Invalid(String),
}

/// A non-negative amount of money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest accepted unit price, one million dollars.
    pub const MAX: Self = Self(Decimal::from_parts(1_000_000, 0, 0, false, 0));

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` for amounts below zero and
    /// `PriceError::TooLarge` above [`Price::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        if amount > Self::MAX.0 {
            return Err(PriceError::TooLarge(amount.to_string()));
        }
        Ok(Self(amount.normalize()))
    }

    /// Create a price from a floating point amount, as stored by document
    /// databases that only know doubles.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NotFinite` for NaN/infinity, otherwise the same
    /// errors as [`Price::new`].
    pub fn from_f64(amount: f64) -> Result<Self, PriceError> {
        if !amount.is_finite() {
            return Err(PriceError::NotFinite);
        }
        let decimal = Decimal::try_from(amount).map_err(|_| {
            if amount < 0.0 {
                PriceError::Negative(Decimal::MIN)
            } else {
                PriceError::TooLarge(amount.to_string())
            }
        })?;
        Self::new(decimal)
    }

    /// The amount in dollars.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount as a double, for stores that persist numbers as doubles.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        // Every Decimal magnitude is within f64 range.
        self.0.to_f64().unwrap_or_default()
    }

    /// Multiply by a quantity (line subtotals). Saturates at `Decimal::MAX`.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map_or(Self(Decimal::MAX), Self)
    }

    /// Add two amounts (running totals). Saturates at `Decimal::MAX`.
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        self.0
            .checked_add(other.0)
            .map_or(Self(Decimal::MAX), Self)
    }

    /// Format for display, e.g. `$19.98`.
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        format!("${rounded:.2}")
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let amount = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| PriceError::Invalid(s.to_string()))?;
        Self::new(amount)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}
