//! # Venue Matching Engine
//!
//! Order-matching and settlement core of a simplified trading venue:
//! per-instrument books of resting limit sells, market-buy matching with
//! partial-fill splitting and parent/child order lineage, atomic settlement
//! (wallet debit/credit, position update), and a correlation protocol that
//! lets a synchronous placement call observe asynchronous matching work.
//!
//! ## Entry point
//!
//! Use [`Engine`] as the single entry point: create with [`Engine::new`],
//! open instruments with [`Engine::register_instrument`], then
//! [`Engine::place`] and [`Engine::cancel`].
//!
//! ## Example (synchronous core)
//!
//! The matching algorithm itself is synchronous and can be driven directly:
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use venue_matching_engine::{
//!     match_buy, AccountId, InMemoryAuditSink, InMemoryOrderLog, InstrumentId, Ledger,
//!     MatchOutcome, Order, OrderBook, OrderId, OrderIdSource, OrderLog,
//! };
//!
//! let instrument = InstrumentId(1);
//! let mut book = OrderBook::new(instrument);
//! let ledger = Ledger::new();
//! let log = InMemoryOrderLog::new();
//! let audit = InMemoryAuditSink::new();
//! let ids = OrderIdSource::starting_at(100);
//!
//! ledger.deposit(AccountId(1), Decimal::from(1000)).unwrap();
//! let sell = Order::limit_sell(OrderId(1), AccountId(2), instrument, 100, Decimal::from(10), 0);
//! log.insert(sell.clone()).unwrap();
//! book.insert(&sell).unwrap();
//!
//! let buy = Order::market_buy(OrderId(2), AccountId(1), instrument, 60, 0);
//! log.insert(buy.clone()).unwrap();
//! let outcome = match_buy(&mut book, &ledger, &log, &audit, &ids, &buy, 0);
//! assert!(matches!(outcome, MatchOutcome::Matched { quantity: 60, .. }));
//! assert_eq!(ledger.balance(AccountId(1)), Decimal::from(400));
//! ```
//!
//! ## Concurrency model
//!
//! Matching workers are tokio tasks, a fixed pool per instrument; book
//! mutations within one instrument are serialized by a per-instrument lock,
//! wallet/position deltas by per-account locks. Placement callers of buys
//! block on a correlation channel with a bounded timeout.

pub mod api;
pub mod audit;
pub mod broker;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod matching;
pub mod order_book;
pub mod order_log;
pub mod persistence;
pub mod types;
pub mod worker;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, StdoutAuditSink};
pub use broker::{Delivery, MatchBroker, MatchConsumer};
pub use correlation::Correlator;
pub use engine::{Engine, EngineConfig, VenueSnapshot};
pub use error::{BrokerError, CancelError, LedgerError, LogError, PlaceError, ValidationError};
pub use intake::{Intake, PlaceOutcome, PlaceRequest};
pub use ledger::{AccountState, Ledger, LedgerSnapshot, TradeRecord};
pub use matching::match_buy;
pub use order_book::{BookEntry, BookStore, OrderBook};
pub use order_log::{InMemoryOrderLog, OrderLog, OrderUpdate};
pub use types::{
    AccountId, InstrumentId, MatchOutcome, MatchRequest, MatchResult, Order, OrderId,
    OrderIdSource, OrderKind, OrderStatus, Side, TradeId, UnmatchedReason,
};
pub use worker::{spawn_workers, WorkerContext};
