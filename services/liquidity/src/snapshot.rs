//! Book snapshotter
//!
//! Periodic job that merges every maker's resting levels into one
//! consolidated, price-sorted book per (chain, market), derives best
//! bid/ask and the size-weighted mid, republishes a short-lived cached
//! snapshot, and garbage-collects markets whose liquidity has drained.
//!
//! The cache maps are owned here and handed to the query and quote
//! components by handle, making snapshot lifetime an explicit contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use types::ids::{ChainId, MarketId};
use types::market::BookLevel;
use types::numeric::{Price, Quantity};
use types::order::Side;

use crate::broadcast::{BroadcastFabric, OutboundEvent};
use crate::config::CoreConfig;
use crate::levels::{LiquidityStore, MakerLiquidityRecord};
use crate::store::{BookKey, TtlMap};

/// Consolidated view of one market's resting liquidity.
///
/// Bids sorted descending, asks ascending, both bounded to the
/// configured depth. Sizes at equal prices are summed across makers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedBook {
    pub market: MarketId,
    /// Descending by price (best bid first).
    pub bids: Vec<BookLevel>,
    /// Ascending by price (best ask first).
    pub asks: Vec<BookLevel>,
    /// Size-weighted mid; absent when either side is empty or degenerate.
    pub mid: Option<Decimal>,
    /// Unix nanos of the sweep that built this snapshot.
    pub built_at: i64,
}

/// O(1) best-of-book entry. TTL-less, last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
}

/// One ticker row of a `lastprice` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRow {
    pub market: MarketId,
    /// Size-weighted mid at the last sweep.
    pub price: Decimal,
    /// Delta against the previously published price.
    pub change: Decimal,
    pub quote_volume: Decimal,
    pub base_volume: Decimal,
}

/// Outcome counters for a single sweep tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Active markets visited.
    pub swept: usize,
    /// Markets evicted because their merged book was empty.
    pub evicted: usize,
    /// Snapshots published.
    pub published: usize,
    /// Maker records skipped as malformed.
    pub skipped_records: usize,
}

/// Cumulative traded volume per market, fed by auction fills.
#[derive(Debug, Default)]
pub struct VolumeTracker {
    totals: DashMap<BookKey, (Decimal, Decimal)>,
}

impl VolumeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one fill's base and quote amounts.
    pub fn record(&self, book: &BookKey, base: Decimal, quote: Decimal) {
        let mut entry = self.totals.entry(book.clone()).or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += base;
        entry.1 += quote;
    }

    /// (base, quote) traded so far for a market.
    pub fn totals(&self, book: &BookKey) -> (Decimal, Decimal) {
        self.totals
            .get(book)
            .map(|entry| *entry.value())
            .unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }

    fn forget(&self, book: &BookKey) {
        self.totals.remove(book);
    }
}

/// Snapshot cache handles shared with the query and quote components.
#[derive(Debug)]
pub struct SnapshotCache {
    snapshots: TtlMap<BookKey, ConsolidatedBook>,
    top: DashMap<BookKey, TopOfBook>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self {
            snapshots: TtlMap::new(),
            top: DashMap::new(),
        }
    }

    /// The live consolidated book, if the snapshot has not expired.
    pub fn book(&self, key: &BookKey, now: i64) -> Option<ConsolidatedBook> {
        self.snapshots.get(key, now)
    }

    /// Level-1 best bid/ask. Served even when the full snapshot expired.
    pub fn top(&self, key: &BookKey) -> Option<TopOfBook> {
        self.top.get(key).map(|entry| *entry.value())
    }

    fn publish(&self, key: BookKey, book: ConsolidatedBook, ttl_nanos: i64, now: i64) {
        let top = TopOfBook {
            best_bid: book.bids.first().map(|level| level.price),
            best_ask: book.asks.first().map(|level| level.price),
        };
        self.top.insert(key.clone(), top);
        self.snapshots.insert(key, book, ttl_nanos, now);
    }

    fn drop_book(&self, key: &BookKey, now: i64) {
        self.snapshots.remove(key, now);
        self.top.remove(key);
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

struct TickerState {
    last_price: Decimal,
}

/// Periodic consolidation job.
pub struct BookSnapshotter {
    levels: Arc<LiquidityStore>,
    cache: Arc<SnapshotCache>,
    volumes: Arc<VolumeTracker>,
    fabric: BroadcastFabric,
    tickers: DashMap<BookKey, TickerState>,
    config: CoreConfig,
}

impl BookSnapshotter {
    pub fn new(
        levels: Arc<LiquidityStore>,
        cache: Arc<SnapshotCache>,
        volumes: Arc<VolumeTracker>,
        fabric: BroadcastFabric,
        config: CoreConfig,
    ) -> Self {
        Self {
            levels,
            cache,
            volumes,
            fabric,
            tickers: DashMap::new(),
            config,
        }
    }

    /// Run one sweep tick over every active market.
    ///
    /// A maker record that fails validation is skipped individually and
    /// never aborts the tick for other makers or markets.
    pub fn sweep(&self, now: i64) -> SweepReport {
        let mut report = SweepReport::default();
        let mut tickers_by_chain: BTreeMap<ChainId, Vec<TickerRow>> = BTreeMap::new();

        for key in self.levels.active_books() {
            report.swept += 1;

            let records = self.levels.records_for(&key);
            let (bids, asks, skipped) = self.consolidate(&records, now);
            report.skipped_records += skipped;

            if bids.is_empty() && asks.is_empty() {
                debug!(book = %key, "evicting drained market");
                self.levels.purge_market(&key);
                self.cache.drop_book(&key, now);
                self.tickers.remove(&key);
                self.volumes.forget(&key);
                report.evicted += 1;
                continue;
            }

            let mid = weighted_mid(&bids, &asks);
            let book = ConsolidatedBook {
                market: key.market.clone(),
                bids,
                asks,
                mid,
                built_at: now,
            };

            self.cache
                .publish(key.clone(), book.clone(), self.config.snapshot_ttl_nanos, now);
            self.fabric.publish(&OutboundEvent::Liquidity2 {
                chain: key.chain,
                market: key.market.clone(),
                book,
            });
            report.published += 1;

            // A degenerate mid skips the last-price publication this tick.
            if let Some(mid) = mid.filter(|m| *m > Decimal::ZERO) {
                let row = self.ticker_row(&key, mid);
                tickers_by_chain.entry(key.chain).or_default().push(row);
            }
        }

        for (chain, rows) in tickers_by_chain {
            self.fabric.publish(&OutboundEvent::LastPrice { chain, rows });
        }

        info!(
            swept = report.swept,
            evicted = report.evicted,
            published = report.published,
            skipped = report.skipped_records,
            "sweep complete"
        );
        report
    }

    /// Merge maker records into sorted, bounded sides.
    ///
    /// Returns (bids desc, asks asc, skipped_record_count). Expired
    /// levels are dropped; a record violating the size/price invariants
    /// is skipped whole.
    fn consolidate(
        &self,
        records: &[MakerLiquidityRecord],
        now: i64,
    ) -> (Vec<BookLevel>, Vec<BookLevel>, usize) {
        let mut bid_levels: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        let mut ask_levels: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        let mut skipped = 0;

        for record in records {
            if let Err(reason) = validate_record(record) {
                warn!(maker = %record.maker, %reason, "skipping malformed maker record");
                skipped += 1;
                continue;
            }

            for level in &record.levels {
                if level.is_expired(now) {
                    continue;
                }
                let side_map = match level.side {
                    Side::Bid => &mut bid_levels,
                    Side::Ask => &mut ask_levels,
                };
                *side_map.entry(level.price.as_decimal()).or_insert(Decimal::ZERO) +=
                    level.size.as_decimal();
            }
        }

        let depth = self.config.depth_limit;
        let bids = bid_levels
            .into_iter()
            .rev()
            .take(depth)
            .filter_map(to_book_level)
            .collect();
        let asks = ask_levels
            .into_iter()
            .take(depth)
            .filter_map(to_book_level)
            .collect();

        (bids, asks, skipped)
    }

    fn ticker_row(&self, key: &BookKey, mid: Decimal) -> TickerRow {
        let change = match self.tickers.get(key) {
            Some(state) => mid - state.last_price,
            None => Decimal::ZERO,
        };
        self.tickers
            .insert(key.clone(), TickerState { last_price: mid });

        let (base_volume, quote_volume) = self.volumes.totals(key);
        TickerRow {
            market: key.market.clone(),
            price: mid,
            change,
            quote_volume,
            base_volume,
        }
    }
}

fn to_book_level((price, size): (Decimal, Decimal)) -> Option<BookLevel> {
    Some(BookLevel::new(Price::try_new(price)?, Quantity::try_new(size)?))
}

fn validate_record(record: &MakerLiquidityRecord) -> Result<(), String> {
    for level in &record.levels {
        if level.size.is_zero() {
            return Err(format!("resting level at {} has zero size", level.price));
        }
        if level.owner != record.maker {
            return Err("level owner does not match record maker".to_string());
        }
    }
    Ok(())
}

/// Size-weighted mid across both sides:
/// (Σ ask p·s / Σ ask s + Σ bid p·s / Σ bid s) / 2.
///
/// Returns None when either side is empty or has zero total size.
fn weighted_mid(bids: &[BookLevel], asks: &[BookLevel]) -> Option<Decimal> {
    let side_average = |levels: &[BookLevel]| -> Option<Decimal> {
        let total_size: Decimal = levels.iter().map(|l| l.size.as_decimal()).sum();
        if total_size <= Decimal::ZERO {
            return None;
        }
        let weighted: Decimal = levels
            .iter()
            .map(|l| l.price.as_decimal() * l.size.as_decimal())
            .sum();
        weighted.checked_div(total_size)
    };

    let bid_avg = side_average(bids)?;
    let ask_avg = side_average(asks)?;
    (bid_avg + ask_avg).checked_div(Decimal::from(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::LevelSubmission;
    use crate::oracle::StaticPriceOracle;
    use std::str::FromStr;
    use types::ids::AccountId;
    use types::market::{MarketCatalog, MarketSpec};

    const T0: i64 = 1_708_123_456_789_000_000;
    const NANOS_PER_SEC: i64 = crate::store::NANOS_PER_SEC;

    fn catalog() -> Arc<MarketCatalog> {
        let mut catalog = MarketCatalog::new();
        for market in ["ETH/USDT", "BTC/USDT"] {
            catalog.register(MarketSpec {
                market: MarketId::new(market),
                price_decimals: 2,
                base_decimals: 6,
                quote_decimals: 2,
                fee_rate: Decimal::ZERO,
                min_base_size: Quantity::from_str("0.001").unwrap(),
            });
        }
        Arc::new(catalog)
    }

    struct Fixture {
        levels: Arc<LiquidityStore>,
        cache: Arc<SnapshotCache>,
        snapshotter: BookSnapshotter,
        fabric: BroadcastFabric,
    }

    fn fixture() -> Fixture {
        let oracle = StaticPriceOracle::new();
        oracle.set("ETH", Decimal::from(2000));
        oracle.set("BTC", Decimal::from(50000));

        let config = CoreConfig::default();
        let levels = Arc::new(LiquidityStore::new(
            catalog(),
            Arc::new(oracle),
            Arc::new(TtlMap::new()),
            config.clone(),
        ));
        let cache = Arc::new(SnapshotCache::new());
        let fabric = BroadcastFabric::new(64);
        let snapshotter = BookSnapshotter::new(
            Arc::clone(&levels),
            Arc::clone(&cache),
            Arc::new(VolumeTracker::new()),
            fabric.clone(),
            config,
        );
        Fixture {
            levels,
            cache,
            snapshotter,
            fabric,
        }
    }

    fn submission(side: &str, price: &str, size: &str) -> LevelSubmission {
        LevelSubmission {
            side: side.to_string(),
            price: price.to_string(),
            size: size.to_string(),
            expires_at: None,
        }
    }

    fn push(fixture: &Fixture, maker: AccountId, rows: Vec<LevelSubmission>) {
        let errors = fixture
            .levels
            .update_liquidity(ChainId::new(1), &MarketId::new("ETH/USDT"), maker, rows, T0)
            .unwrap();
        assert!(errors.is_empty());
    }

    fn eth_book(fixture: &Fixture, now: i64) -> Option<ConsolidatedBook> {
        fixture
            .cache
            .book(&BookKey::new(ChainId::new(1), MarketId::new("ETH/USDT")), now)
    }

    #[test]
    fn test_sweep_merges_makers_and_sums_equal_prices() {
        let fixture = fixture();
        push(
            &fixture,
            AccountId::new(),
            vec![submission("BID", "2000", "1.0"), submission("ASK", "2002", "1.0")],
        );
        push(
            &fixture,
            AccountId::new(),
            vec![submission("BID", "2000", "0.5"), submission("BID", "1999", "2.0")],
        );

        let report = fixture.snapshotter.sweep(T0 + 1);
        assert_eq!(report.swept, 1);
        assert_eq!(report.published, 1);
        assert_eq!(report.evicted, 0);

        let book = eth_book(&fixture, T0 + 2).unwrap();
        assert_eq!(book.bids.len(), 2);
        // Sizes summed at the shared 2000 level, best bid first.
        assert_eq!(book.bids[0].price, Price::from_u64(2000));
        assert_eq!(book.bids[0].size, Quantity::from_str("1.5").unwrap());
        assert_eq!(book.bids[1].price, Price::from_u64(1999));
        assert_eq!(book.asks.len(), 1);
    }

    #[test]
    fn test_resubmission_is_idempotent() {
        let fixture = fixture();
        let maker = AccountId::new();
        let rows = vec![
            submission("BID", "2000", "1.0"),
            submission("ASK", "2002", "2.0"),
        ];

        push(&fixture, maker, rows.clone());
        fixture.snapshotter.sweep(T0 + 1);
        let first = eth_book(&fixture, T0 + 2).unwrap();

        push(&fixture, maker, rows);
        fixture.snapshotter.sweep(T0 + 3);
        let second = eth_book(&fixture, T0 + 4).unwrap();

        assert_eq!(first.bids, second.bids);
        assert_eq!(first.asks, second.asks);
    }

    #[test]
    fn test_drained_market_evicted() {
        let fixture = fixture();
        let maker = AccountId::new();
        push(&fixture, maker, vec![submission("BID", "2000", "1.0")]);

        fixture.snapshotter.sweep(T0 + 1);
        assert!(eth_book(&fixture, T0 + 2).is_some());

        // Maker withdraws everything: empty replacement set.
        push(&fixture, maker, vec![]);
        let report = fixture.snapshotter.sweep(T0 + 3);
        assert_eq!(report.evicted, 1);
        assert!(eth_book(&fixture, T0 + 4).is_none());
        assert!(fixture.levels.active_books().is_empty());
    }

    #[test]
    fn test_expired_levels_drop_out() {
        let fixture = fixture();
        push(&fixture, AccountId::new(), vec![submission("BID", "2000", "1.0")]);

        // Levels expire 9s after the update; sweep at +10s sees nothing.
        let report = fixture.snapshotter.sweep(T0 + 10 * NANOS_PER_SEC);
        assert_eq!(report.evicted, 1);
    }

    #[test]
    fn test_snapshot_expires_after_ttl() {
        let fixture = fixture();
        push(&fixture, AccountId::new(), vec![submission("BID", "2000", "1.0")]);
        fixture.snapshotter.sweep(T0 + 1);

        assert!(eth_book(&fixture, T0 + 14 * NANOS_PER_SEC).is_some());
        assert!(eth_book(&fixture, T0 + 16 * NANOS_PER_SEC).is_none());

        // Best-of-book is TTL-less and survives.
        let top = fixture
            .cache
            .top(&BookKey::new(ChainId::new(1), MarketId::new("ETH/USDT")))
            .unwrap();
        assert_eq!(top.best_bid, Some(Price::from_u64(2000)));
    }

    #[test]
    fn test_weighted_mid() {
        // bids: 100×2, 99×3 → avg (200+297)/5 = 99.4
        // asks: 101×2, 102×4 → avg (202+408)/6 = 101.666…
        let bids = vec![
            BookLevel::new(Price::from_u64(100), Quantity::from_u64(2)),
            BookLevel::new(Price::from_u64(99), Quantity::from_u64(3)),
        ];
        let asks = vec![
            BookLevel::new(Price::from_u64(101), Quantity::from_u64(2)),
            BookLevel::new(Price::from_u64(102), Quantity::from_u64(4)),
        ];

        let mid = weighted_mid(&bids, &asks).unwrap();
        let expected = (Decimal::from_str("99.4").unwrap()
            + Decimal::from(610) / Decimal::from(6))
            / Decimal::from(2);
        assert_eq!(mid, expected);
    }

    #[test]
    fn test_one_sided_book_has_no_mid_but_publishes() {
        let fixture = fixture();
        push(&fixture, AccountId::new(), vec![submission("BID", "2000", "1.0")]);

        let mut rx = fixture.fabric.subscribe();
        let report = fixture.snapshotter.sweep(T0 + 1);
        assert_eq!(report.published, 1);

        let book = eth_book(&fixture, T0 + 2).unwrap();
        assert!(book.mid.is_none());

        // liquidity2 still goes out; lastprice does not.
        let envelope = rx.try_recv().unwrap();
        assert!(envelope.payload.contains("liquidity2"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_lastprice_batched_per_chain() {
        let fixture = fixture();
        push(
            &fixture,
            AccountId::new(),
            vec![submission("BID", "2000", "1.0"), submission("ASK", "2002", "1.0")],
        );
        fixture
            .levels
            .update_liquidity(
                ChainId::new(2),
                &MarketId::new("BTC/USDT"),
                AccountId::new(),
                vec![submission("BID", "50000", "1.0"), submission("ASK", "50100", "1.0")],
                T0,
            )
            .unwrap();

        let mut rx = fixture.fabric.subscribe();
        fixture.snapshotter.sweep(T0 + 1);

        let mut lastprice_topics = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if envelope.payload.contains("\"event\":\"lastprice\"") {
                lastprice_topics.push(envelope.topic);
            }
        }
        lastprice_topics.sort();
        assert_eq!(lastprice_topics, vec!["chain:1:lastprice", "chain:2:lastprice"]);
    }

    #[test]
    fn test_depth_bounded_to_limit() {
        let mut config = CoreConfig::default();
        config.depth_limit = 2;

        let oracle = StaticPriceOracle::new();
        oracle.set("ETH", Decimal::from(2000));
        let levels = Arc::new(LiquidityStore::new(
            catalog(),
            Arc::new(oracle),
            Arc::new(TtlMap::new()),
            config.clone(),
        ));
        let cache = Arc::new(SnapshotCache::new());
        let snapshotter = BookSnapshotter::new(
            Arc::clone(&levels),
            Arc::clone(&cache),
            Arc::new(VolumeTracker::new()),
            BroadcastFabric::new(8),
            config,
        );

        levels
            .update_liquidity(
                ChainId::new(1),
                &MarketId::new("ETH/USDT"),
                AccountId::new(),
                vec![
                    submission("BID", "2000", "1.0"),
                    submission("BID", "1999", "1.0"),
                    submission("BID", "1998", "1.0"),
                ],
                T0,
            )
            .unwrap();
        snapshotter.sweep(T0 + 1);

        let book = cache
            .book(&BookKey::new(ChainId::new(1), MarketId::new("ETH/USDT")), T0 + 2)
            .unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[0].price, Price::from_u64(2000));
        assert_eq!(book.bids[1].price, Price::from_u64(1999));
    }
}
