//! Order book query service
//!
//! Serves the consolidated book at three granularities from the
//! snapshotter's cache handles. A missing or expired snapshot reads as
//! an empty book, never as an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use types::ids::{ChainId, MarketId};
use types::market::{BookLevel, MarketCatalog};
use types::numeric::{Price, Quantity};

use crate::config::CoreConfig;
use crate::snapshot::SnapshotCache;
use crate::store::BookKey;

/// Query granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookGranularity {
    /// Level 1: best bid/ask only, from the O(1) cache.
    Top,
    /// Level 2: snapshot bucketed around mid.
    Bucketed,
    /// Level 3: the full bounded snapshot, unaggregated.
    Full,
}

impl BookGranularity {
    /// Parse the wire-level numeric granularity (1, 2, or 3).
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(BookGranularity::Top),
            2 => Some(BookGranularity::Bucketed),
            3 => Some(BookGranularity::Full),
            _ => None,
        }
    }
}

/// A consolidated book view shaped for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookView {
    pub market: MarketId,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    /// Descending by price; empty at level 1.
    pub bids: Vec<BookLevel>,
    /// Ascending by price; empty at level 1.
    pub asks: Vec<BookLevel>,
}

impl OrderBookView {
    fn empty(market: MarketId) -> Self {
        Self {
            market,
            best_bid: None,
            best_ask: None,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty() && self.best_bid.is_none() && self.best_ask.is_none()
    }
}

/// Read-side service over the snapshot cache.
pub struct OrderBookQuery {
    cache: Arc<SnapshotCache>,
    catalog: Arc<MarketCatalog>,
    config: CoreConfig,
}

impl OrderBookQuery {
    pub fn new(cache: Arc<SnapshotCache>, catalog: Arc<MarketCatalog>, config: CoreConfig) -> Self {
        Self {
            cache,
            catalog,
            config,
        }
    }

    /// Serve the book at the requested granularity.
    ///
    /// `depth` additionally merges every run of depth/2 consecutive
    /// entries per side, summing sizes.
    pub fn get_order_book(
        &self,
        chain: ChainId,
        market: &MarketId,
        depth: Option<usize>,
        granularity: BookGranularity,
        now: i64,
    ) -> OrderBookView {
        let key = BookKey::new(chain, market.clone());

        if granularity == BookGranularity::Top {
            let top = self.cache.top(&key);
            return OrderBookView {
                market: market.clone(),
                best_bid: top.and_then(|t| t.best_bid),
                best_ask: top.and_then(|t| t.best_ask),
                bids: Vec::new(),
                asks: Vec::new(),
            };
        }

        let Some(book) = self.cache.book(&key, now) else {
            return OrderBookView::empty(market.clone());
        };

        let (mut bids, mut asks) = match granularity {
            BookGranularity::Full | BookGranularity::Top => (book.bids, book.asks),
            BookGranularity::Bucketed => {
                let price_decimals = self
                    .catalog
                    .get(market)
                    .map(|spec| spec.price_decimals)
                    .unwrap_or(8);
                match book.mid {
                    Some(mid) if mid > Decimal::ZERO => {
                        let step = mid * self.config.level2_step_ratio;
                        (
                            bucket_side(&book.bids, mid, step, price_decimals),
                            bucket_side(&book.asks, mid, step, price_decimals),
                        )
                    }
                    // No usable mid: nothing to bucket around.
                    _ => (book.bids, book.asks),
                }
            }
        };

        if let Some(depth) = depth {
            let run = depth / 2;
            if run >= 2 {
                bids = merge_runs(bids, run);
                asks = merge_runs(asks, run);
            }
        }

        OrderBookView {
            market: market.clone(),
            best_bid: bids.first().map(|l| l.price),
            best_ask: asks.first().map(|l| l.price),
            bids,
            asks,
        }
    }
}

/// Group one best-first side into distance-from-mid buckets of `step`.
///
/// The bucket keeps its best entry's price, rounded to the market's
/// price precision, and the summed size of its members.
fn bucket_side(levels: &[BookLevel], mid: Decimal, step: Decimal, price_decimals: u32) -> Vec<BookLevel> {
    if step <= Decimal::ZERO {
        return levels.to_vec();
    }

    let mut buckets: BTreeMap<u64, (Decimal, Decimal)> = BTreeMap::new();
    for level in levels {
        let distance = (level.price.as_decimal() - mid).abs();
        let index = (distance / step).floor().to_u64().unwrap_or(u64::MAX);

        buckets
            .entry(index)
            .and_modify(|(_, size)| *size += level.size.as_decimal())
            .or_insert((level.price.as_decimal(), level.size.as_decimal()));
    }

    buckets
        .into_values()
        .filter_map(|(price, size)| {
            let rounded = price.round_dp(price_decimals);
            Some(BookLevel::new(Price::try_new(rounded)?, Quantity::try_new(size)?))
        })
        .collect()
}

/// Merge consecutive runs of `run` entries, summing size. The merged
/// entry carries the run's worst price (its size is available at that
/// price or better).
fn merge_runs(levels: Vec<BookLevel>, run: usize) -> Vec<BookLevel> {
    levels
        .chunks(run)
        .filter_map(|chunk| {
            let size: Decimal = chunk.iter().map(|l| l.size.as_decimal()).sum();
            let worst = chunk.last()?;
            Some(BookLevel::new(worst.price, Quantity::try_new(size)?))
        })
        .collect()
}
