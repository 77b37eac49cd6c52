//! Venue engine: constructs and wires the book store, ledger, order log,
//! broker, correlator, and per-instrument worker pools.
//!
//! Single entry point for callers: [`Engine::place`], [`Engine::cancel`], the
//! account admin/read paths, and lifecycle ([`Engine::register_instrument`],
//! [`Engine::shutdown`]). All collaborator handles are owned here and injected
//! downward; nothing lives in module-level globals.

use crate::audit::{AuditSink, StdoutAuditSink};
use crate::broker::MatchBroker;
use crate::correlation::Correlator;
use crate::error::{CancelError, LedgerError, PlaceError};
use crate::ledger::{Ledger, LedgerSnapshot, TradeRecord};
use crate::order_book::{BookEntry, BookStore};
use crate::order_log::{InMemoryOrderLog, OrderLog};
use crate::intake::{Intake, PlaceOutcome, PlaceRequest};
use crate::types::{
    AccountId, InstrumentId, MatchResult, Order, OrderId, OrderIdSource,
};
use crate::worker::{spawn_workers, WorkerContext};
use log::info;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Engine tuning knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Workers consuming each instrument's match queue.
    pub workers_per_instrument: usize,
    /// How long a buy placement waits for its correlated result.
    pub match_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers_per_instrument: 2,
            match_timeout: Duration::from_secs(5),
        }
    }
}

/// Serializable engine-owned state (books + ledger + id high-water mark) for
/// restart recovery. Order history lives with the durable log collaborator
/// and is not part of this snapshot; restored resting entries are re-recorded
/// as `InProgress` sells so the log stays coherent.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VenueSnapshot {
    pub books: HashMap<InstrumentId, Vec<BookEntry>>,
    pub ledger: LedgerSnapshot,
    pub next_order_id: u64,
}

pub struct Engine {
    config: EngineConfig,
    books: Arc<BookStore>,
    ledger: Arc<Ledger>,
    log: Arc<dyn OrderLog>,
    broker: Arc<MatchBroker>,
    correlator: Arc<Correlator>,
    audit: Arc<dyn AuditSink>,
    order_ids: Arc<OrderIdSource>,
    intake: Intake,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Engine with the in-memory order log and stdout audit sink.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryOrderLog::new()),
            Arc::new(StdoutAuditSink),
        )
    }

    /// Engine over caller-supplied collaborator implementations.
    pub fn with_collaborators(
        config: EngineConfig,
        log: Arc<dyn OrderLog>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let books = Arc::new(BookStore::new());
        let ledger = Arc::new(Ledger::new());
        let broker = Arc::new(MatchBroker::new());
        let correlator = Arc::new(Correlator::new());
        let order_ids = Arc::new(OrderIdSource::default());
        let (shutdown, _) = watch::channel(false);
        let intake = Intake::new(
            Arc::clone(&books),
            Arc::clone(&ledger),
            Arc::clone(&log),
            Arc::clone(&broker),
            Arc::clone(&correlator),
            Arc::clone(&audit),
            Arc::clone(&order_ids),
            config.match_timeout,
        );
        Self {
            config,
            books,
            ledger,
            log,
            broker,
            correlator,
            audit,
            order_ids,
            intake,
            shutdown,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Opens an instrument for trading: book, queue, and worker pool. Returns
    /// `false` if the instrument was already registered. Must be called from
    /// within a tokio runtime.
    pub fn register_instrument(&self, instrument: InstrumentId) -> bool {
        if !self.books.register(instrument) {
            return false;
        }
        self.broker.register(instrument);
        let ctx = Arc::new(WorkerContext {
            books: Arc::clone(&self.books),
            ledger: Arc::clone(&self.ledger),
            log: Arc::clone(&self.log),
            audit: Arc::clone(&self.audit),
            correlator: Arc::clone(&self.correlator),
            order_ids: Arc::clone(&self.order_ids),
        });
        let handles = spawn_workers(
            instrument,
            self.config.workers_per_instrument,
            &self.broker,
            ctx,
            self.shutdown.subscribe(),
        );
        self.workers.lock().expect("lock").extend(handles);
        info!(
            "instrument {} open with {} workers",
            instrument.0, self.config.workers_per_instrument
        );
        true
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.books.instruments()
    }

    /// Places an order; see [`Intake::place`].
    pub async fn place(&self, request: PlaceRequest) -> Result<PlaceOutcome, PlaceError> {
        self.intake.place(request).await
    }

    /// Cancels a resting sell; see [`Intake::cancel`].
    pub fn cancel(&self, account: AccountId, order_id: OrderId) -> Result<(), CancelError> {
        self.intake.cancel(account, order_id)
    }

    pub fn deposit(&self, account: AccountId, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.ledger.deposit(account, amount)
    }

    pub fn balance(&self, account: AccountId) -> Decimal {
        self.ledger.balance(account)
    }

    /// Seeds shares into an account (admin path).
    pub fn grant_shares(&self, account: AccountId, instrument: InstrumentId, quantity: u64) {
        self.ledger.credit_position(account, instrument, quantity);
    }

    pub fn positions(&self, account: AccountId) -> HashMap<InstrumentId, u64> {
        self.ledger.positions(account)
    }

    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.log.find_by_id(order_id).ok().flatten()
    }

    pub fn orders_for(&self, account: AccountId) -> Vec<Order> {
        self.log.find_by_account(account).unwrap_or_default()
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.ledger.trades()
    }

    /// Claims the retained result of a buy whose caller timed out.
    pub fn reconcile(&self, order_id: OrderId) -> Option<MatchResult> {
        self.correlator.take_unclaimed(order_id)
    }

    /// Captures engine-owned state for persistence.
    pub fn snapshot(&self) -> VenueSnapshot {
        let mut books = HashMap::new();
        for instrument in self.books.instruments() {
            if let Some(book) = self.books.book(instrument) {
                books.insert(instrument, book.lock().expect("lock").snapshot());
            }
        }
        VenueSnapshot {
            books,
            ledger: self.ledger.snapshot(),
            next_order_id: self.order_ids.peek(),
        }
    }

    /// Restores a snapshot into a freshly built engine: registers each
    /// instrument, reloads its resting entries, re-records them in the order
    /// log, and restores ledger state. Call before serving traffic.
    pub fn restore(&self, snapshot: VenueSnapshot) {
        self.ledger.restore(snapshot.ledger);
        self.order_ids.advance_to(snapshot.next_order_id);
        for (instrument, entries) in snapshot.books {
            self.register_instrument(instrument);
            if let Some(book) = self.books.book(instrument) {
                book.lock().expect("lock").restore(&entries);
            }
            // Minimal log records so restored entries stay cancellable and
            // matchable; original timestamps and lineage live with the
            // durable-log collaborator.
            for entry in entries {
                let _ = self.log.insert(Order::limit_sell(
                    entry.order_id,
                    entry.account,
                    instrument,
                    entry.quantity,
                    entry.price,
                    0,
                ));
            }
        }
        info!("snapshot restored; next order id {}", self.order_ids.peek());
    }

    /// Stops all worker pools and waits for them to drain.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().expect("lock"));
        for handle in handles {
            let _ = handle.await;
        }
        info!("engine shut down");
    }
}
