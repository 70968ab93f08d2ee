//! Per-market configuration
//!
//! Decimal precision, the fixed taker fee rate, and the fee-derived
//! minimum resting size. The catalog is registered once at startup and
//! read-only afterwards.

use crate::ids::MarketId;
use crate::numeric::{Price, Quantity};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static configuration for a single market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSpec {
    pub market: MarketId,
    /// Decimal places for displayed/bucketed prices.
    pub price_decimals: u32,
    /// Decimal places for base-asset amounts.
    pub base_decimals: u32,
    /// Decimal places for quote-asset amounts.
    pub quote_decimals: u32,
    /// Fixed taker fee, as a fraction (e.g. 0.001 = 10 bps).
    pub fee_rate: Decimal,
    /// Fee-derived minimum resting size, used when no USD price is known.
    pub min_base_size: Quantity,
}

impl MarketSpec {
    /// Round a raw price to this market's price precision.
    pub fn round_price(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.price_decimals, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Round a raw base amount to this market's base precision.
    pub fn round_base(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.base_decimals, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Round a raw quote amount to this market's quote precision.
    pub fn round_quote(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.quote_decimals, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Registry of configured markets.
///
/// Built during startup; handed out behind an `Arc` and never mutated
/// while the engine is running.
#[derive(Debug, Clone, Default)]
pub struct MarketCatalog {
    markets: HashMap<MarketId, MarketSpec>,
}

impl MarketCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a market spec, replacing any previous entry.
    pub fn register(&mut self, spec: MarketSpec) {
        self.markets.insert(spec.market.clone(), spec);
    }

    /// Look up a market spec.
    pub fn get(&self, market: &MarketId) -> Option<&MarketSpec> {
        self.markets.get(market)
    }

    /// Number of registered markets.
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

/// A plain (price, size) pair used in consolidated book payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Quantity,
}

impl BookLevel {
    pub fn new(price: Price, size: Quantity) -> Self {
        Self { price, size }
    }
}
