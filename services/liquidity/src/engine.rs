//! Service wiring
//!
//! Owns every component of the liquidity core, shares the cache and
//! lock handles between them, and exposes the public call surface.
//! One engine instance serves one logical process; inbound calls run as
//! independent tasks and synchronize only through the shared maps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use types::errors::CoreError;
use types::ids::{AccountId, ChainId, MarketId, OrderId};
use types::market::MarketCatalog;
use types::numeric::Quantity;
use types::order::Side;

use crate::auction::{AuctionCoordinator, FillOffer};
use crate::broadcast::{BroadcastFabric, Envelope};
use crate::config::CoreConfig;
use crate::levels::{LevelSubmission, LiquidityStore};
use crate::oracle::UsdPriceOracle;
use crate::orders::OrderStore;
use crate::query::{BookGranularity, OrderBookQuery, OrderBookView};
use crate::quote::{LadderQuoteEngine, Quote};
use crate::snapshot::{BookSnapshotter, SnapshotCache, SweepReport, VolumeTracker};
use crate::store::{now_nanos, TtlMap};

/// The assembled liquidity/quoting/matching core.
pub struct LiquidityEngine {
    config: CoreConfig,
    fabric: BroadcastFabric,
    levels: Arc<LiquidityStore>,
    snapshotter: Arc<BookSnapshotter>,
    query: OrderBookQuery,
    quotes: LadderQuoteEngine,
    auction: AuctionCoordinator,
}

impl LiquidityEngine {
    pub fn new(
        config: CoreConfig,
        catalog: Arc<MarketCatalog>,
        oracle: Arc<dyn UsdPriceOracle>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        let fabric = BroadcastFabric::default();
        let busy_locks = Arc::new(TtlMap::new());
        let fences = Arc::new(TtlMap::new());
        let cache = Arc::new(SnapshotCache::new());
        let volumes = Arc::new(VolumeTracker::new());

        let levels = Arc::new(LiquidityStore::new(
            Arc::clone(&catalog),
            oracle,
            Arc::clone(&busy_locks),
            config.clone(),
        ));
        let snapshotter = Arc::new(BookSnapshotter::new(
            Arc::clone(&levels),
            Arc::clone(&cache),
            Arc::clone(&volumes),
            fabric.clone(),
            config.clone(),
        ));
        let query = OrderBookQuery::new(Arc::clone(&cache), Arc::clone(&catalog), config.clone());
        let quotes =
            LadderQuoteEngine::new(Arc::clone(&cache), Arc::clone(&catalog), config.clone());
        let auction = AuctionCoordinator::new(
            orders,
            fences,
            busy_locks,
            volumes,
            fabric.clone(),
            config.clone(),
        );

        Self {
            config,
            fabric,
            levels,
            snapshotter,
            query,
            quotes,
            auction,
        }
    }

    /// Subscribe to the outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.fabric.subscribe()
    }

    /// Replace a maker's resting levels for one market.
    pub fn update_liquidity(
        &self,
        chain: ChainId,
        market: &MarketId,
        maker: AccountId,
        submissions: Vec<LevelSubmission>,
    ) -> Result<Vec<String>, CoreError> {
        self.levels
            .update_liquidity(chain, market, maker, submissions, now_nanos())
    }

    /// Serve the consolidated book at the requested granularity.
    pub fn get_order_book(
        &self,
        chain: ChainId,
        market: &MarketId,
        depth: Option<usize>,
        granularity: BookGranularity,
    ) -> OrderBookView {
        self.query
            .get_order_book(chain, market, depth, granularity, now_nanos())
    }

    /// Price a requested size against the consolidated book.
    pub fn quote(
        &self,
        chain: ChainId,
        market: &MarketId,
        side: Side,
        base_size: Option<Quantity>,
        quote_size: Option<Quantity>,
    ) -> Result<Quote, CoreError> {
        self.quotes
            .quote(chain, market, side, base_size, quote_size, now_nanos())
    }

    /// Submit a maker's fill offer for a taker order.
    pub async fn match_order(
        &self,
        chain: ChainId,
        order_id: OrderId,
        offer: FillOffer,
    ) -> Result<(), CoreError> {
        self.auction
            .match_order(chain, order_id, offer, now_nanos())
            .await
    }

    /// Run one consolidation sweep immediately.
    pub fn sweep_once(&self) -> SweepReport {
        self.snapshotter.sweep(now_nanos())
    }

    /// Spawn the fixed-interval sweep loop.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let snapshotter = Arc::clone(&self.snapshotter);
        let auction = self.auction.clone();
        let interval = Duration::from_nanos(self.config.sweep_interval_nanos.max(0) as u64);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = now_nanos();
                let report = snapshotter.sweep(now);
                let purged = auction.purge_expired(now);
                debug!(
                    swept = report.swept,
                    evicted = report.evicted,
                    purged,
                    "periodic sweep tick"
                );
            }
        })
    }
}
