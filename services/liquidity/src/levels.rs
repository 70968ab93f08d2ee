//! Liquidity store
//!
//! Per-(chain, market) holder of each maker's current resting levels.
//! A maker's update replaces its whole level set — no merge, no
//! optimistic-concurrency token, last writer wins. Records live only in
//! memory; the book is rebuilt from scratch as makers re-subscribe.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use types::errors::CoreError;
use types::ids::{AccountId, ChainId, MarketId};
use types::market::MarketCatalog;
use types::numeric::{Price, Quantity};
use types::order::Side;

use crate::config::CoreConfig;
use crate::oracle::UsdPriceOracle;
use crate::store::{BookKey, MakerBusyLock, TtlMap, NANOS_PER_SEC};

/// A wire-shaped resting level as submitted by a maker.
///
/// Side, price, and size arrive as strings; validation turns them into
/// typed fields or a human-readable error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSubmission {
    pub side: String,
    pub price: String,
    pub size: String,
    /// Requested expiry, Unix nanos. Clamped to the 9s horizon.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// A validated resting level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub side: Side,
    pub price: Price,
    pub size: Quantity,
    /// Unix nanos; never more than the horizon past the update time.
    pub expires_at: i64,
    pub owner: AccountId,
}

impl LiquidityLevel {
    /// Whether the level is past its expiry.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// One maker's full level set for a (chain, market).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakerLiquidityRecord {
    pub maker: AccountId,
    pub levels: Vec<LiquidityLevel>,
    pub updated_at: i64,
}

/// Key for one maker's record within a (chain, market).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MakerBookKey {
    book: BookKey,
    maker: AccountId,
}

/// Holds every maker's resting levels, partitioned per (chain, market).
pub struct LiquidityStore {
    records: DashMap<MakerBookKey, MakerLiquidityRecord>,
    /// Markets that have seen at least one update since their last eviction.
    active: DashMap<BookKey, ()>,
    busy_locks: Arc<TtlMap<AccountId, MakerBusyLock>>,
    catalog: Arc<MarketCatalog>,
    oracle: Arc<dyn UsdPriceOracle>,
    config: CoreConfig,
}

impl LiquidityStore {
    pub fn new(
        catalog: Arc<MarketCatalog>,
        oracle: Arc<dyn UsdPriceOracle>,
        busy_locks: Arc<TtlMap<AccountId, MakerBusyLock>>,
        config: CoreConfig,
    ) -> Self {
        Self {
            records: DashMap::new(),
            active: DashMap::new(),
            busy_locks,
            catalog,
            oracle,
            config,
        }
    }

    /// Replace a maker's level set for one market.
    ///
    /// Malformed rows are dropped with an error string; rows below the
    /// market's minimum size are dropped silently. Returns the list of
    /// validation errors (empty ⇒ fully accepted). The whole call is
    /// rejected while the maker holds a busy lock.
    pub fn update_liquidity(
        &self,
        chain: ChainId,
        market: &MarketId,
        maker: AccountId,
        submissions: Vec<LevelSubmission>,
        now: i64,
    ) -> Result<Vec<String>, CoreError> {
        if let Some(lock) = self.busy_locks.get(&maker, now) {
            let remaining = self
                .busy_locks
                .remaining_ttl(&maker, now)
                .unwrap_or(0);
            return Err(CoreError::MakerBusy {
                order_id: lock.order_id,
                remaining_secs: remaining / NANOS_PER_SEC,
            });
        }

        let spec = self
            .catalog
            .get(market)
            .ok_or_else(|| CoreError::Validation(format!("unknown market '{}'", market)))?;

        let min_size = self.minimum_size(market, &spec.min_base_size);
        let horizon = now.saturating_add(self.config.level_expiry_horizon_nanos);

        let mut accepted = Vec::with_capacity(submissions.len());
        let mut errors = Vec::new();

        for (index, row) in submissions.into_iter().enumerate() {
            let side = match Side::parse(&row.side) {
                Some(side) => side,
                None => {
                    errors.push(format!("level {}: invalid side '{}'", index, row.side));
                    continue;
                }
            };

            let price = match Decimal::from_str(&row.price) {
                Ok(price) if price >= Decimal::ZERO => price,
                Ok(price) => {
                    errors.push(format!("level {}: negative price '{}'", index, price));
                    continue;
                }
                Err(_) => {
                    errors.push(format!("level {}: invalid price '{}'", index, row.price));
                    continue;
                }
            };

            let size = match Decimal::from_str(&row.size) {
                Ok(size) => size,
                Err(_) => {
                    errors.push(format!("level {}: invalid size '{}'", index, row.size));
                    continue;
                }
            };

            // Dust filter: below-minimum sizes vanish without an error.
            if size < min_size {
                debug!(%market, %maker, %size, %min_size, "dropping below-minimum level");
                continue;
            }

            let expires_at = row.expires_at.map_or(horizon, |t| t.min(horizon));

            accepted.push(LiquidityLevel {
                side,
                price: Price::try_new(price).unwrap_or_else(Price::zero),
                size: Quantity::try_new(size).unwrap_or_else(Quantity::zero),
                expires_at,
                owner: maker,
            });
        }

        let key = MakerBookKey {
            book: BookKey::new(chain, market.clone()),
            maker,
        };
        debug!(
            %chain,
            %market,
            %maker,
            accepted = accepted.len(),
            rejected = errors.len(),
            "replacing maker level set"
        );
        self.records.insert(
            key,
            MakerLiquidityRecord {
                maker,
                levels: accepted,
                updated_at: now,
            },
        );
        self.active.insert(BookKey::new(chain, market.clone()), ());

        Ok(errors)
    }

    /// Minimum acceptable level size for a market: USD floor over the
    /// base asset's live USD price, falling back to the fee-derived
    /// minimum when no price is known.
    fn minimum_size(&self, market: &MarketId, fallback: &Quantity) -> Decimal {
        let usd = self.oracle.usd_price(market.base());
        if usd > Decimal::ZERO {
            self.config.min_level_notional_usd / usd
        } else {
            fallback.as_decimal()
        }
    }

    /// Every market currently marked active.
    pub fn active_books(&self) -> Vec<BookKey> {
        self.active.iter().map(|entry| entry.key().clone()).collect()
    }

    /// All maker records for one market.
    pub fn records_for(&self, book: &BookKey) -> Vec<MakerLiquidityRecord> {
        self.records
            .iter()
            .filter(|entry| &entry.key().book == book)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drop a market from the active set along with its maker records.
    pub fn purge_market(&self, book: &BookKey) {
        self.active.remove(book);
        self.records.retain(|key, _| &key.book != book);
    }

    /// Number of maker records held across all markets.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
