//! Durable order log collaborator.
//!
//! Orders are inserted once and then only status-transitioned, never deleted.
//! The trait is the seam a real store (document DB, SQL) plugs into; the
//! in-memory implementation backs the engine by default and the test suites.

use crate::error::LogError;
use crate::types::{AccountId, Order, OrderId, OrderStatus, TradeId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// Fields a lifecycle transition may change on a recorded order.
#[derive(Clone, Debug)]
pub struct OrderUpdate {
    pub status: OrderStatus,
    /// New (remaining) quantity, for partial fills.
    pub quantity: Option<u64>,
    /// Executed price, recorded on completion.
    pub executed_price: Option<Decimal>,
    /// Settlement reference, recorded on completion.
    pub trade: Option<TradeId>,
}

impl OrderUpdate {
    /// A bare status transition.
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status,
            quantity: None,
            executed_price: None,
            trade: None,
        }
    }

    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_execution(mut self, price: Decimal, trade: TradeId) -> Self {
        self.executed_price = Some(price);
        self.trade = Some(trade);
        self
    }
}

/// Append/query log of every order the venue has accepted.
pub trait OrderLog: Send + Sync {
    fn insert(&self, order: Order) -> Result<(), LogError>;
    fn update(&self, order_id: OrderId, update: OrderUpdate) -> Result<(), LogError>;
    fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, LogError>;
    fn find_by_account(&self, account: AccountId) -> Result<Vec<Order>, LogError>;
}

#[derive(Debug, Default)]
struct LogInner {
    by_id: HashMap<OrderId, Order>,
    /// Insertion order, for stable account listings.
    sequence: Vec<OrderId>,
}

/// In-memory order log. Clone-free; share via `Arc<dyn OrderLog>`.
#[derive(Debug, Default)]
pub struct InMemoryOrderLog {
    inner: Mutex<LogInner>,
}

impl InMemoryOrderLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderLog for InMemoryOrderLog {
    fn insert(&self, order: Order) -> Result<(), LogError> {
        let mut inner = self.inner.lock().expect("lock");
        if inner.by_id.contains_key(&order.id) {
            return Err(LogError::Duplicate(order.id));
        }
        inner.sequence.push(order.id);
        inner.by_id.insert(order.id, order);
        Ok(())
    }

    fn update(&self, order_id: OrderId, update: OrderUpdate) -> Result<(), LogError> {
        let mut inner = self.inner.lock().expect("lock");
        let order = inner
            .by_id
            .get_mut(&order_id)
            .ok_or(LogError::NotFound(order_id))?;
        order.status = update.status;
        if let Some(quantity) = update.quantity {
            order.quantity = quantity;
        }
        if let Some(price) = update.executed_price {
            order.price = Some(price);
        }
        if let Some(trade) = update.trade {
            order.trade = Some(trade);
        }
        Ok(())
    }

    fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, LogError> {
        Ok(self.inner.lock().expect("lock").by_id.get(&order_id).cloned())
    }

    fn find_by_account(&self, account: AccountId) -> Result<Vec<Order>, LogError> {
        let inner = self.inner.lock().expect("lock");
        Ok(inner
            .sequence
            .iter()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|o| o.account == account)
            .cloned()
            .collect())
    }
}
