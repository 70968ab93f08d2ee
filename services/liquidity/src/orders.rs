//! Authoritative order store contract
//!
//! The taker order book of record lives in an external relational
//! store; this subsystem consumes only its call contract: read an open
//! order, transition it Open → Matched (guarded by current status), and
//! insert a fill row. `InMemoryOrderStore` implements the contract for
//! tests and local simulation with the same atomicity guarantees.

use async_trait::async_trait;
use dashmap::DashMap;

use types::errors::CoreError;
use types::ids::{ChainId, FillId, OrderId};
use types::order::{Fill, OpenOrder, OrderStatus};

use crate::store::OrderKey;

/// Call contract against the authoritative order store.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Read an order row, whatever its status. Absent rows read as None.
    async fn read_order(&self, chain: ChainId, order_id: OrderId)
        -> Result<Option<OpenOrder>, CoreError>;

    /// Attempt the Open → Matched transition.
    ///
    /// Returns true when *this* call performed the transition; false
    /// when the row was absent or no longer open. Must be atomic under
    /// concurrent callers.
    async fn transition_to_matched(
        &self,
        chain: ChainId,
        order_id: OrderId,
        now: i64,
    ) -> Result<bool, CoreError>;

    /// Insert a fill row, returning its id.
    async fn insert_fill(&self, fill: Fill) -> Result<FillId, CoreError>;
}

/// In-memory reference implementation of the order store contract.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<OrderKey, OpenOrder>,
    fills: DashMap<FillId, Fill>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order row.
    pub fn insert_order(&self, order: OpenOrder) {
        self.orders
            .insert(OrderKey::new(order.chain, order.order_id), order);
    }

    /// Current row, if any.
    pub fn order(&self, chain: ChainId, order_id: OrderId) -> Option<OpenOrder> {
        self.orders
            .get(&OrderKey::new(chain, order_id))
            .map(|entry| entry.value().clone())
    }

    /// Fill rows inserted so far.
    pub fn fills(&self) -> Vec<Fill> {
        self.fills.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn read_order(
        &self,
        chain: ChainId,
        order_id: OrderId,
    ) -> Result<Option<OpenOrder>, CoreError> {
        Ok(self.order(chain, order_id))
    }

    async fn transition_to_matched(
        &self,
        chain: ChainId,
        order_id: OrderId,
        now: i64,
    ) -> Result<bool, CoreError> {
        let key = OrderKey::new(chain, order_id);
        // The entry guard holds the shard lock, making the
        // status-check-and-set atomic like the stored procedure it mirrors.
        match self.orders.get_mut(&key) {
            Some(mut order) if order.status.is_open() => {
                order.status = OrderStatus::Matched;
                order.updated_at = now;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn insert_fill(&self, fill: Fill) -> Result<FillId, CoreError> {
        let fill_id = fill.fill_id;
        self.fills.insert(fill_id, fill);
        Ok(fill_id)
    }
}
