//! Tunables for the liquidity core
//!
//! Durations are Unix-nanosecond spans so they compose directly with
//! the exchange-clock timestamps threaded through every component.

use rust_decimal::Decimal;

use crate::store::NANOS_PER_SEC;

/// Configuration for the liquidity, quoting, and auction components.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Interval between consolidation sweeps (default: 10s).
    pub sweep_interval_nanos: i64,
    /// TTL of a published consolidated book (default: 15s). A snapshot
    /// older than this reads as absent.
    pub snapshot_ttl_nanos: i64,
    /// Maximum levels kept per side in the consolidated book.
    pub depth_limit: usize,
    /// Horizon a resting level's expiry is clamped to (default: 9s).
    pub level_expiry_horizon_nanos: i64,
    /// USD notional floor below which a resting level is dropped silently.
    pub min_level_notional_usd: Decimal,
    /// Collection window between the first fill offer and settlement
    /// (default: 250ms). Hard and non-cancellable once armed.
    pub auction_window_nanos: i64,
    /// TTL of collected auction state; must exceed the window so offers
    /// survive until settlement fires.
    pub auction_state_ttl_nanos: i64,
    /// TTL of the consumed-order fence (default: 60s).
    pub fence_ttl_nanos: i64,
    /// TTL of a winning maker's busy lock (default: 300s).
    pub busy_lock_ttl_nanos: i64,
    /// Soft-price buffer applied when the base leg was requested.
    pub slippage_base_leg: Decimal,
    /// Soft-price buffer applied when the quote leg was requested.
    pub slippage_quote_leg: Decimal,
    /// Level-2 bucket width as a fraction of mid (default: 5 bps).
    pub level2_step_ratio: Decimal,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_nanos: 10 * NANOS_PER_SEC,
            snapshot_ttl_nanos: 15 * NANOS_PER_SEC,
            depth_limit: 200,
            level_expiry_horizon_nanos: 9 * NANOS_PER_SEC,
            min_level_notional_usd: Decimal::from(10),
            auction_window_nanos: 250_000_000,
            auction_state_ttl_nanos: 2 * NANOS_PER_SEC,
            fence_ttl_nanos: 60 * NANOS_PER_SEC,
            busy_lock_ttl_nanos: 300 * NANOS_PER_SEC,
            slippage_base_leg: Decimal::from_str_exact("0.0005").unwrap(),
            slippage_quote_leg: Decimal::from_str_exact("0.001").unwrap(),
            level2_step_ratio: Decimal::from_str_exact("0.0005").unwrap(),
        }
    }
}
