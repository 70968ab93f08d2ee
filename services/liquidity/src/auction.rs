//! RFQ auction coordinator
//!
//! Broadcasts nothing itself until settlement: competing maker fill
//! offers for one taker order collect for a fixed window, then a single
//! settlement pass picks the best-price winner, transitions the
//! authoritative order row, fences out late callers, and busy-locks the
//! winning maker until its on-chain fill confirms or the lock times out.
//!
//! Which caller arms the window is decided by an atomic create-if-absent
//! on the auction state — never by inferring firstness from a size
//! check. Settlement walks the offer pool as a bounded loop; giving up
//! is the explicit `Exhausted` terminal value.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use types::errors::CoreError;
use types::ids::{AccountId, ChainId, FillId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{Fill, FillStatus, OpenOrder, OrderStatus, Side};

use crate::broadcast::{BroadcastFabric, OrderStatusRow, OutboundEvent};
use crate::config::CoreConfig;
use crate::orders::OrderStore;
use crate::snapshot::VolumeTracker;
use crate::store::{BookKey, MakerBusyLock, OrderConsumedFence, OrderKey, TtlMap};

/// A maker's competing offer to fill a taker order.
///
/// `amount` is the counter-leg the maker will deliver: quote for a
/// sell-side order, base for a buy-side order. Consumed exactly once —
/// selected as winner or discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillOffer {
    pub maker: AccountId,
    pub amount: Quantity,
    pub routing_token: String,
}

/// An offer scored by its effective price against the order's
/// remaining size.
#[derive(Debug, Clone, PartialEq)]
struct ScoredOffer {
    price: Decimal,
    offer: FillOffer,
    received_at: i64,
}

/// Collected offers for one order, live only during the window.
#[derive(Debug, Clone)]
struct AuctionState {
    /// Order row snapshot read when the window was armed.
    order: OpenOrder,
    offers: Vec<ScoredOffer>,
    armed_at: i64,
}

/// Terminal result of one settlement pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// A winner was assigned and the fill row inserted.
    Matched {
        winner: AccountId,
        fill_id: FillId,
        price: Decimal,
    },
    /// Every offer was tried and discarded.
    Exhausted,
    /// The auction state was gone or stale when the timer fired.
    WindowExpired,
}

/// Coordinates offer collection and single-winner settlement per order.
#[derive(Clone)]
pub struct AuctionCoordinator {
    states: Arc<DashMap<OrderKey, AuctionState>>,
    fences: Arc<TtlMap<OrderKey, OrderConsumedFence>>,
    busy_locks: Arc<TtlMap<AccountId, MakerBusyLock>>,
    orders: Arc<dyn OrderStore>,
    fabric: BroadcastFabric,
    volumes: Arc<VolumeTracker>,
    config: CoreConfig,
}

impl AuctionCoordinator {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        fences: Arc<TtlMap<OrderKey, OrderConsumedFence>>,
        busy_locks: Arc<TtlMap<AccountId, MakerBusyLock>>,
        volumes: Arc<VolumeTracker>,
        fabric: BroadcastFabric,
        config: CoreConfig,
    ) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            fences,
            busy_locks,
            orders,
            fabric,
            volumes,
            config,
        }
    }

    /// Submit a maker's fill offer for an order.
    ///
    /// The first accepted offer arms the collection window and schedules
    /// settlement exactly once; later offers within the window join the
    /// pool. Rejections carry a short reason; intra-auction contention
    /// is never surfaced.
    pub async fn match_order(
        &self,
        chain: ChainId,
        order_id: OrderId,
        offer: FillOffer,
        now: i64,
    ) -> Result<(), CoreError> {
        let key = OrderKey::new(chain, order_id);

        if self.fences.contains(&key, now) {
            return Err(CoreError::Conflict(format!(
                "order {} already matched",
                order_id
            )));
        }

        // Re-read from the authoritative store; the cached auction state
        // is never trusted for openness.
        let order = self
            .orders
            .read_order(chain, order_id)
            .await?
            .ok_or_else(|| CoreError::Conflict(format!("order {} not found", order_id)))?;
        if !order.is_open() {
            return Err(CoreError::Conflict(format!("order {} not open", order_id)));
        }
        if offer.maker == order.owner {
            return Err(CoreError::Authorization(
                "cannot fill own order".to_string(),
            ));
        }

        let price = effective_price(&order, &offer)?;
        let scored = ScoredOffer {
            price,
            offer,
            received_at: now,
        };

        let state_ttl = self.config.auction_state_ttl_nanos;
        let armed = match self.states.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().armed_at.saturating_add(state_ttl) <= now {
                    // Stale leftovers from a window that never settled.
                    occupied.insert(AuctionState {
                        order,
                        offers: vec![scored],
                        armed_at: now,
                    });
                    true
                } else {
                    occupied.get_mut().offers.push(scored);
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(AuctionState {
                    order,
                    offers: vec![scored],
                    armed_at: now,
                });
                true
            }
        };

        if armed {
            debug!(%key, %price, "first offer armed collection window");
            self.schedule_settlement(chain, order_id, now);
        } else {
            debug!(%key, %price, "offer joined open window");
        }

        Ok(())
    }

    /// Arm the hard, non-cancellable settlement timer.
    fn schedule_settlement(&self, chain: ChainId, order_id: OrderId, now: i64) {
        let coordinator = self.clone();
        let window = self.config.auction_window_nanos;
        let fire_at = now.saturating_add(window);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_nanos(window.max(0) as u64)).await;
            let outcome = coordinator.settle(chain, order_id, fire_at).await;
            debug!(%order_id, ?outcome, "settlement pass finished");
        });
    }

    /// Run the settlement pass for one order.
    ///
    /// Pops the extremal offer (max price for a sell-side order, min for
    /// a buy-side one) and tries the Open → Matched transition,
    /// cascading to the next-best offer when the row was consumed
    /// elsewhere. Runs once per order per window.
    pub async fn settle(&self, chain: ChainId, order_id: OrderId, now: i64) -> SettlementOutcome {
        let key = OrderKey::new(chain, order_id);

        let Some((_, state)) = self.states.remove(&key) else {
            return SettlementOutcome::WindowExpired;
        };
        if state.armed_at.saturating_add(self.config.auction_state_ttl_nanos) <= now {
            debug!(%key, "auction state expired before settlement fired");
            return SettlementOutcome::WindowExpired;
        }

        let order = state.order;
        let mut pool = state.offers;
        sort_best_first(&mut pool, order.side);

        let mut losers: Vec<ScoredOffer> = Vec::new();
        let mut winner: Option<ScoredOffer> = None;
        let mut pool = pool.into_iter();

        for candidate in pool.by_ref() {
            if self.busy_locks.contains(&candidate.offer.maker, now) {
                warn!(
                    %key,
                    maker = %candidate.offer.maker,
                    "skipping busy-locked maker"
                );
                losers.push(candidate);
                continue;
            }

            match self
                .orders
                .transition_to_matched(chain, order_id, now)
                .await
            {
                Ok(true) => {
                    winner = Some(candidate);
                    break;
                }
                Ok(false) => {
                    // Consumed elsewhere; the next-best offer gets its try.
                    debug!(%key, "order transition refused, cascading");
                    losers.push(candidate);
                }
                Err(err) => {
                    error!(%key, %err, "order store failure during settlement");
                    losers.push(candidate);
                }
            }
        }
        losers.extend(pool);

        let Some(winning) = winner else {
            info!(%key, discarded = losers.len(), "auction exhausted without a winner");
            return SettlementOutcome::Exhausted;
        };

        let fill = build_fill(&order, &winning, now);
        let fill_id = match self.orders.insert_fill(fill.clone()).await {
            Ok(fill_id) => fill_id,
            Err(err) => {
                // The order row is already Matched; keep fencing so the
                // assignment cannot be handed out twice.
                error!(%key, %err, "fill insert failed after transition");
                fill.fill_id
            }
        };

        self.fences.insert(
            key,
            OrderConsumedFence {
                winner: winning.offer.maker,
                matched_at: now,
            },
            self.config.fence_ttl_nanos,
            now,
        );
        self.busy_locks.insert(
            winning.offer.maker,
            MakerBusyLock {
                order_id,
                routing_token: winning.offer.routing_token.clone(),
            },
            self.config.busy_lock_ttl_nanos,
            now,
        );
        self.volumes.record(
            &BookKey::new(chain, order.market.clone()),
            fill.base_amount.as_decimal(),
            fill.quote_amount.as_decimal(),
        );

        info!(
            %key,
            winner = %winning.offer.maker,
            price = %winning.price,
            losers = losers.len(),
            "auction matched"
        );
        self.notify_matched(&order, &winning, &fill, &losers);

        SettlementOutcome::Matched {
            winner: winning.offer.maker,
            fill_id,
            price: winning.price,
        }
    }

    /// Post-settlement fan-out: winner privately, owner, market, losers.
    /// Best-effort only; a late offer may miss its notice.
    fn notify_matched(
        &self,
        order: &OpenOrder,
        winning: &ScoredOffer,
        fill: &Fill,
        losers: &[ScoredOffer],
    ) {
        let mut matched_order = order.clone();
        matched_order.status = OrderStatus::Matched;

        self.fabric.publish(&OutboundEvent::UserOrderMatch {
            chain: order.chain,
            maker: winning.offer.maker,
            order: matched_order,
            offer: winning.offer.clone(),
        });
        self.fabric.publish(&OutboundEvent::OrderStatus {
            chain: order.chain,
            owner: order.owner,
            rows: vec![OrderStatusRow {
                chain: order.chain,
                order_id: order.order_id,
                status: OrderStatus::Matched,
                remaining: None,
            }],
        });
        self.fabric.publish(&OutboundEvent::Fills {
            chain: order.chain,
            market: order.market.clone(),
            fills: vec![fill.clone()],
        });
        for loser in losers {
            self.fabric.publish(&OutboundEvent::ErrorNotice {
                chain: order.chain,
                maker: loser.offer.maker,
                reason: "filled by better offer".to_string(),
            });
        }
    }

    /// Number of live auctions (for observability).
    pub fn open_auctions(&self) -> usize {
        self.states.len()
    }

    /// Drop expired fences and busy locks. Expiry is otherwise lazy;
    /// the periodic sweep calls this so dead entries do not pile up.
    pub fn purge_expired(&self, now: i64) -> usize {
        self.fences.purge_expired(now) + self.busy_locks.purge_expired(now)
    }
}

/// Effective price implied by an offer against the order's remaining
/// size, always expressed as quote per base.
fn effective_price(order: &OpenOrder, offer: &FillOffer) -> Result<Decimal, CoreError> {
    let amount = offer.amount.as_decimal();
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(
            "offer amount must be positive".to_string(),
        ));
    }

    match order.side {
        // Taker sells base; the offer amount is the quote the maker pays.
        Side::Ask => {
            let base = order.remaining_base.as_decimal();
            if base <= Decimal::ZERO {
                return Err(CoreError::Conflict("order has no remaining size".to_string()));
            }
            Ok(amount / base)
        }
        // Taker buys base; the offer amount is the base the maker delivers.
        Side::Bid => {
            let quote = order.remaining_quote.as_decimal();
            if quote <= Decimal::ZERO {
                return Err(CoreError::Conflict("order has no remaining size".to_string()));
            }
            Ok(quote / amount)
        }
    }
}

/// Best offer first: the taker always gets the best counter-price —
/// highest for a sell-side order, lowest for a buy-side one. Ties go to
/// the earlier offer.
fn sort_best_first(pool: &mut [ScoredOffer], taker_side: Side) {
    pool.sort_by(|a, b| {
        let by_price = match taker_side {
            Side::Ask => b.price.cmp(&a.price),
            Side::Bid => a.price.cmp(&b.price),
        };
        by_price.then(a.received_at.cmp(&b.received_at))
    });
}

fn build_fill(order: &OpenOrder, winning: &ScoredOffer, now: i64) -> Fill {
    let (base_amount, quote_amount) = match order.side {
        Side::Ask => (order.remaining_base, winning.offer.amount),
        Side::Bid => (winning.offer.amount, order.remaining_quote),
    };

    Fill {
        fill_id: FillId::new(),
        chain: order.chain,
        order_id: order.order_id,
        market: order.market.clone(),
        maker: winning.offer.maker,
        taker: order.owner,
        price: Price::try_new(winning.price).unwrap_or_else(Price::zero),
        base_amount,
        quote_amount,
        status: FillStatus::Matched,
        created_at: now,
    }
}
