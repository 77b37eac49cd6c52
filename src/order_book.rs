//! Per-instrument order book of resting limit sells, price-time priority.
//!
//! One side only: this venue's buys are market orders that consume resting
//! sells, so the book never holds bids. Best entry is the lowest price; ties
//! break by arrival sequence. Partial consumption reduces an entry in place so
//! it keeps its position in the time-priority queue at its price level.

use crate::error::ValidationError;
use crate::types::{AccountId, InstrumentId, Order, OrderId};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

/// A resting sell entry. `arrival` is the book-local sequence number assigned
/// on insertion and preserved across partial fills.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BookEntry {
    pub order_id: OrderId,
    pub account: AccountId,
    pub price: Decimal,
    pub quantity: u64,
    pub arrival: u64,
}

/// Single-instrument book. Exclusively owned by the [`BookStore`]; callers
/// reach it through the store's per-instrument lock.
#[derive(Debug)]
pub struct OrderBook {
    instrument: InstrumentId,
    /// Price level -> FIFO queue of entries in arrival order.
    asks: BTreeMap<Decimal, VecDeque<BookEntry>>,
    /// Order id -> price level, for cancel and remove_and_reduce.
    index: HashMap<OrderId, Decimal>,
    next_arrival: u64,
}

impl OrderBook {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            asks: BTreeMap::new(),
            index: HashMap::new(),
            next_arrival: 1,
        }
    }

    pub fn instrument(&self) -> InstrumentId {
        self.instrument
    }

    /// Rests a limit sell on the book, assigning its arrival sequence.
    pub fn insert(&mut self, order: &Order) -> Result<(), ValidationError> {
        let price = order.price.ok_or(ValidationError::SellWithoutPrice)?;
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.asks.entry(price).or_default().push_back(BookEntry {
            order_id: order.id,
            account: order.account,
            price,
            quantity: order.quantity,
            arrival,
        });
        self.index.insert(order.id, price);
        Ok(())
    }

    /// The lowest-price, earliest-arrival entry, or `None` if the book is empty.
    pub fn peek_best(&self) -> Option<&BookEntry> {
        self.asks.values().next().and_then(|queue| queue.front())
    }

    /// Removes the entry; if `new_quantity > 0`, keeps it at its original
    /// price and arrival position with the reduced quantity. Returns `false`
    /// if the order is not resting on this book.
    pub fn remove_and_reduce(&mut self, order_id: OrderId, new_quantity: u64) -> bool {
        let Some(&price) = self.index.get(&order_id) else {
            return false;
        };
        let Some(queue) = self.asks.get_mut(&price) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|e| e.order_id == order_id) else {
            return false;
        };
        if new_quantity > 0 {
            queue[pos].quantity = new_quantity;
        } else {
            queue.remove(pos);
            self.index.remove(&order_id);
            if queue.is_empty() {
                self.asks.remove(&price);
            }
        }
        true
    }

    /// Removes an entry outright (cancellation). Returns it if it was resting.
    pub fn remove(&mut self, order_id: OrderId) -> Option<BookEntry> {
        let price = self.index.remove(&order_id)?;
        let queue = self.asks.get_mut(&price)?;
        let pos = queue.iter().position(|e| e.order_id == order_id)?;
        let entry = queue.remove(pos);
        if queue.is_empty() {
            self.asks.remove(&price);
        }
        entry
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Best (lowest) resting price, if any.
    pub fn best_price(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Resting entries in match order (price ascending, arrival ascending).
    pub fn snapshot(&self) -> Vec<BookEntry> {
        self.asks.values().flatten().cloned().collect()
    }

    /// Restores resting entries (e.g. after load from persistence). Clears the
    /// book first; arrival sequences are preserved from the snapshot.
    pub fn restore(&mut self, entries: &[BookEntry]) {
        self.asks.clear();
        self.index.clear();
        let mut max_arrival = 0;
        let mut sorted: Vec<BookEntry> = entries.to_vec();
        sorted.sort_by(|a, b| a.arrival.cmp(&b.arrival));
        for entry in sorted {
            max_arrival = max_arrival.max(entry.arrival);
            self.index.insert(entry.order_id, entry.price);
            self.asks.entry(entry.price).or_default().push_back(entry);
        }
        self.next_arrival = max_arrival + 1;
    }
}

/// All books, one lockable book per instrument. Operations on different
/// instruments never contend; within one instrument the `Mutex` provides the
/// exclusive scope the matching algorithm requires.
#[derive(Debug, Default)]
pub struct BookStore {
    books: RwLock<HashMap<InstrumentId, Arc<Mutex<OrderBook>>>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty book for the instrument. Returns `false` if one exists.
    pub fn register(&self, instrument: InstrumentId) -> bool {
        let mut books = self.books.write().expect("lock");
        if books.contains_key(&instrument) {
            return false;
        }
        books.insert(instrument, Arc::new(Mutex::new(OrderBook::new(instrument))));
        true
    }

    /// The lockable book for an instrument, if registered.
    pub fn book(&self, instrument: InstrumentId) -> Option<Arc<Mutex<OrderBook>>> {
        self.books.read().expect("lock").get(&instrument).cloned()
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.books.read().expect("lock").keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Order;

    fn sell(id: u64, qty: u64, price: i64, account: u64) -> Order {
        Order::limit_sell(
            OrderId(id),
            AccountId(account),
            InstrumentId(1),
            qty,
            Decimal::from(price),
            id,
        )
    }

    #[test]
    fn peek_best_returns_lowest_price() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert(&sell(1, 10, 12, 1)).unwrap();
        book.insert(&sell(2, 10, 9, 2)).unwrap();
        book.insert(&sell(3, 10, 11, 3)).unwrap();
        let best = book.peek_best().unwrap();
        assert_eq!(best.order_id, OrderId(2));
        assert_eq!(best.price, Decimal::from(9));
    }

    #[test]
    fn equal_prices_tie_break_by_arrival() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert(&sell(1, 10, 10, 1)).unwrap();
        book.insert(&sell(2, 10, 10, 2)).unwrap();
        assert_eq!(book.peek_best().unwrap().order_id, OrderId(1));
    }

    #[test]
    fn peek_best_on_empty_book_is_none() {
        let book = OrderBook::new(InstrumentId(1));
        assert!(book.peek_best().is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn remove_and_reduce_keeps_time_priority() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert(&sell(1, 100, 10, 1)).unwrap();
        book.insert(&sell(2, 50, 10, 2)).unwrap();
        // Partial fill of order 1 must not send it behind order 2.
        assert!(book.remove_and_reduce(OrderId(1), 40));
        let best = book.peek_best().unwrap();
        assert_eq!(best.order_id, OrderId(1));
        assert_eq!(best.quantity, 40);
    }

    #[test]
    fn remove_and_reduce_to_zero_removes_entry() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert(&sell(1, 10, 10, 1)).unwrap();
        assert!(book.remove_and_reduce(OrderId(1), 0));
        assert!(book.is_empty());
        assert!(book.best_price().is_none());
    }

    #[test]
    fn remove_and_reduce_unknown_order_returns_false() {
        let mut book = OrderBook::new(InstrumentId(1));
        assert!(!book.remove_and_reduce(OrderId(9), 5));
    }

    #[test]
    fn remove_returns_entry_for_cancel() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert(&sell(1, 10, 10, 7)).unwrap();
        let entry = book.remove(OrderId(1)).unwrap();
        assert_eq!(entry.account, AccountId(7));
        assert_eq!(entry.quantity, 10);
        assert!(book.remove(OrderId(1)).is_none());
    }

    #[test]
    fn insert_without_price_rejected() {
        let mut book = OrderBook::new(InstrumentId(1));
        let mut order = sell(1, 10, 10, 1);
        order.price = None;
        assert_eq!(book.insert(&order), Err(ValidationError::SellWithoutPrice));
    }

    #[test]
    fn snapshot_and_restore_round_trip_preserves_order() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert(&sell(1, 10, 10, 1)).unwrap();
        book.insert(&sell(2, 20, 9, 2)).unwrap();
        book.insert(&sell(3, 30, 10, 3)).unwrap();
        let snapshot = book.snapshot();
        assert_eq!(snapshot.len(), 3);

        let mut restored = OrderBook::new(InstrumentId(1));
        restored.restore(&snapshot);
        assert_eq!(restored.peek_best().unwrap().order_id, OrderId(2));
        restored.remove_and_reduce(OrderId(2), 0);
        // Arrival order at price 10 survives the round trip.
        assert_eq!(restored.peek_best().unwrap().order_id, OrderId(1));
        // New insertions sequence after the restored entries.
        restored.insert(&sell(4, 5, 10, 4)).unwrap();
        let entries = restored.snapshot();
        assert_eq!(entries.last().unwrap().order_id, OrderId(4));
    }

    #[test]
    fn store_registers_once_per_instrument() {
        let store = BookStore::new();
        assert!(store.register(InstrumentId(1)));
        assert!(!store.register(InstrumentId(1)));
        assert!(store.book(InstrumentId(1)).is_some());
        assert!(store.book(InstrumentId(2)).is_none());
        assert_eq!(store.instruments(), vec![InstrumentId(1)]);
    }
}
