//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point
//! errors). Both newtypes are non-negative by construction; rounding
//! uses the midpoint-away-from-zero strategy.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

/// A non-negative price expressed in the quote asset.
///
/// Serializes as a string (the crate-wide decimal wire convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero price.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Construct from a decimal, returning None if negative.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Construct from an integer number of quote units.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse from a decimal string.
    pub fn from_str(s: &str) -> Result<Self, String> {
        let value = Decimal::from_str(s).map_err(|e| format!("invalid price '{}': {}", s, e))?;
        Self::try_new(value).ok_or_else(|| format!("invalid price '{}': negative", s))
    }

    /// The inner decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the price is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Round to the given number of decimal places (midpoint away from zero).
    pub fn round_dp(&self, decimals: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative quantity expressed in the base asset.
///
/// Serializes as a string (the crate-wide decimal wire convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Zero quantity.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Construct from a decimal, returning None if negative.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Construct from an integer count of base units.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse from a decimal string.
    pub fn from_str(s: &str) -> Result<Self, String> {
        let value = Decimal::from_str(s).map_err(|e| format!("invalid quantity '{}': {}", s, e))?;
        Self::try_new(value).ok_or_else(|| format!("invalid quantity '{}': negative", s))
    }

    /// The inner decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the quantity is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Round to the given number of decimal places (midpoint away from zero).
    pub fn round_dp(&self, decimals: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
