//! Broadcast fabric
//!
//! Pub/sub fan-out for every state change this subsystem publishes. The
//! session/WebSocket layer subscribes and routes envelopes to clients
//! by topic; delivery is fire-and-forget, at-most-once — a publish with
//! no subscribers or a lagging subscriber is not an error.
//!
//! Topic format: `scope:chainId:target`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use types::ids::{AccountId, ChainId, MarketId, OrderId};
use types::numeric::Quantity;
use types::order::{Fill, OpenOrder, OrderStatus};

use crate::auction::FillOffer;
use crate::snapshot::{ConsolidatedBook, TickerRow};

/// A serialized event plus its routing topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub topic: String,
    /// JSON payload, tagged with the event name.
    pub payload: String,
}

/// One row of an `orderstatus` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusRow {
    pub chain: ChainId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Quantity>,
}

/// Every event this subsystem publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundEvent {
    /// Consolidated book for one market, republished every sweep.
    Liquidity2 {
        chain: ChainId,
        market: MarketId,
        book: ConsolidatedBook,
    },
    /// Per-chain ticker batch.
    #[serde(rename = "lastprice")]
    LastPrice {
        chain: ChainId,
        rows: Vec<TickerRow>,
    },
    /// Order status changes, delivered to the order owner.
    #[serde(rename = "orderstatus")]
    OrderStatus {
        chain: ChainId,
        owner: AccountId,
        rows: Vec<OrderStatusRow>,
    },
    /// Fill ticks for a market.
    Fills {
        chain: ChainId,
        market: MarketId,
        fills: Vec<Fill>,
    },
    /// Private notification to the winning maker: everything needed to
    /// produce the on-chain fill.
    #[serde(rename = "userordermatch")]
    UserOrderMatch {
        chain: ChainId,
        maker: AccountId,
        order: OpenOrder,
        offer: FillOffer,
    },
    /// Private rejection notice to a losing maker.
    #[serde(rename = "error")]
    ErrorNotice {
        chain: ChainId,
        maker: AccountId,
        reason: String,
    },
}

impl OutboundEvent {
    /// Routing topic, `scope:chainId:target`.
    pub fn topic(&self) -> String {
        match self {
            OutboundEvent::Liquidity2 { chain, market, .. } => {
                format!("book:{}:{}", chain, market)
            }
            OutboundEvent::LastPrice { chain, .. } => format!("chain:{}:lastprice", chain),
            OutboundEvent::OrderStatus { chain, owner, .. } => {
                format!("user:{}:{}", chain, owner)
            }
            OutboundEvent::Fills { chain, market, .. } => {
                format!("market:{}:{}", chain, market)
            }
            OutboundEvent::UserOrderMatch { chain, maker, .. } => {
                format!("user:{}:{}", chain, maker)
            }
            OutboundEvent::ErrorNotice { chain, maker, .. } => {
                format!("user:{}:{}", chain, maker)
            }
        }
    }

    /// Event name for logging.
    pub fn label(&self) -> &'static str {
        match self {
            OutboundEvent::Liquidity2 { .. } => "liquidity2",
            OutboundEvent::LastPrice { .. } => "lastprice",
            OutboundEvent::OrderStatus { .. } => "orderstatus",
            OutboundEvent::Fills { .. } => "fills",
            OutboundEvent::UserOrderMatch { .. } => "userordermatch",
            OutboundEvent::ErrorNotice { .. } => "error",
        }
    }
}

/// Fan-out handle shared by every publishing component.
#[derive(Debug, Clone)]
pub struct BroadcastFabric {
    tx: broadcast::Sender<Envelope>,
}

impl BroadcastFabric {
    /// Create a fabric with the given subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Serialize and publish an event. At-most-once: errors (no
    /// subscribers) are swallowed.
    pub fn publish(&self, event: &OutboundEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(event = event.label(), %err, "failed to serialize event");
                return;
            }
        };

        let envelope = Envelope {
            topic: event.topic(),
            payload,
        };
        trace!(topic = %envelope.topic, event = event.label(), "publishing");
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to the full envelope stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastFabric {
    fn default() -> Self {
        Self::new(1024)
    }
}
