//! USD price oracle contract
//!
//! The production oracle is an external price service; this subsystem
//! only consumes its call contract. An unknown symbol reads as zero and
//! callers fall back to the market's fee-derived minimum.

use dashmap::DashMap;
use rust_decimal::Decimal;

/// Read-only USD price source for asset symbols.
pub trait UsdPriceOracle: Send + Sync {
    /// Live USD price for the symbol, or zero when unknown.
    fn usd_price(&self, symbol: &str) -> Decimal;
}

/// Fixed price table, used by tests and local simulation.
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: DashMap<String, Decimal>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the price for a symbol.
    pub fn set(&self, symbol: impl Into<String>, price: Decimal) {
        self.prices.insert(symbol.into(), price);
    }
}

impl UsdPriceOracle for StaticPriceOracle {
    fn usd_price(&self, symbol: &str) -> Decimal {
        self.prices
            .get(symbol)
            .map(|entry| *entry.value())
            .unwrap_or(Decimal::ZERO)
    }
}
