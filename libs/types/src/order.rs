//! Taker order rows, sides, and fill types
//!
//! The authoritative order store lives outside this subsystem; these
//! types mirror its call contract (read an open order, transition it to
//! matched, insert a fill row).

use crate::ids::{AccountId, ChainId, FillId, MarketId, OrderId};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Book side. A bid buys the base asset, an ask sells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy the base asset
    Bid,
    /// Sell the base asset
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Parse a wire-format side string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BID" | "BUY" => Some(Side::Bid),
            "ASK" | "SELL" => Some(Side::Ask),
            _ => None,
        }
    }

    /// Wire label for logging and events
    pub fn label(&self) -> &'static str {
        match self {
            Side::Bid => "BID",
            Side::Ask => "ASK",
        }
    }
}

/// Taker order status as tracked by the authoritative store.
///
/// This subsystem only ever performs the Open → Matched transition;
/// every other transition happens externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepting fill offers
    Open,
    /// Assigned to a maker, awaiting on-chain settlement
    Matched,
    /// Canceled by the owner or the system
    Canceled,
    /// Expired before matching
    Expired,
}

impl OrderStatus {
    /// Whether the order can still be matched
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Open)
    }
}

/// A taker order row as read from the authoritative store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub chain: ChainId,
    pub market: MarketId,
    pub owner: AccountId,
    /// Side from the taker's perspective: Ask sells base, Bid buys base.
    pub side: Side,
    pub remaining_base: Quantity,
    pub remaining_quote: Quantity,
    pub status: OrderStatus,
    /// Unix nanos of the last store write.
    pub updated_at: i64,
}

impl OpenOrder {
    /// Whether the order can still be matched
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Fill row status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FillStatus {
    /// Assigned to a maker, settlement pending
    Matched,
    /// Settled on chain
    Settled,
    /// Settlement failed
    Failed,
}

/// A fill row inserted when an auction selects a winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: FillId,
    pub chain: ChainId,
    pub order_id: OrderId,
    pub market: MarketId,
    pub maker: AccountId,
    pub taker: AccountId,
    /// Effective price of the winning offer (quote per base).
    pub price: Price,
    pub base_amount: Quantity,
    pub quote_amount: Quantity,
    pub status: FillStatus,
    /// Unix nanos when the winner was chosen.
    pub created_at: i64,
}
