//! Order intake: the caller-facing `place` / `cancel` contracts.
//!
//! Sells rest immediately: inventory is reserved up front, the order is
//! recorded, and the entry goes on the book — no matching is attempted until a
//! buy discovers it. Buys dispatch a match request and block on the
//! correlation channel with a bounded timeout; the timeout is caller-side only
//! and never cancels in-flight matching.

use crate::audit::{AuditEvent, AuditSink};
use crate::broker::MatchBroker;
use crate::correlation::Correlator;
use crate::error::{CancelError, LedgerError, PlaceError};
use crate::ledger::Ledger;
use crate::order_book::BookStore;
use crate::order_log::{OrderLog, OrderUpdate};
use crate::types::{
    unix_millis, AccountId, InstrumentId, MatchOutcome, MatchRequest, Order, OrderId,
    OrderIdSource, OrderKind, OrderStatus, Side, TradeId, UnmatchedReason,
};
use log::{info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Placement intent as the caller states it; ids and timestamps are assigned
/// by intake.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct PlaceRequest {
    pub account: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: u64,
    pub price: Option<Decimal>,
}

/// What happened to a placement.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlaceOutcome {
    /// Sell accepted and resting on the book.
    Rested { order_id: OrderId },
    /// Buy matched and settled.
    Filled {
        order_id: OrderId,
        price: Decimal,
        quantity: u64,
        trade: TradeId,
    },
    /// Buy found no fill; the order was cancelled.
    Unfilled {
        order_id: OrderId,
        reason: UnmatchedReason,
    },
    /// The caller stopped waiting. The order stays `InProgress`; its result,
    /// once produced, is retained for out-of-band reconciliation.
    TimedOut { order_id: OrderId },
}

/// Intake over explicitly injected collaborator handles.
pub struct Intake {
    books: Arc<BookStore>,
    ledger: Arc<Ledger>,
    log: Arc<dyn OrderLog>,
    broker: Arc<MatchBroker>,
    correlator: Arc<Correlator>,
    audit: Arc<dyn AuditSink>,
    order_ids: Arc<OrderIdSource>,
    match_timeout: Duration,
}

impl Intake {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        books: Arc<BookStore>,
        ledger: Arc<Ledger>,
        log: Arc<dyn OrderLog>,
        broker: Arc<MatchBroker>,
        correlator: Arc<Correlator>,
        audit: Arc<dyn AuditSink>,
        order_ids: Arc<OrderIdSource>,
        match_timeout: Duration,
    ) -> Self {
        Self {
            books,
            ledger,
            log,
            broker,
            correlator,
            audit,
            order_ids,
            match_timeout,
        }
    }

    /// Validates, records, and routes one placement.
    pub async fn place(&self, request: PlaceRequest) -> Result<PlaceOutcome, PlaceError> {
        let order = self.build_order(&request);
        order.validate_shape()?;
        if self.books.book(order.instrument).is_none() {
            return Err(PlaceError::UnknownInstrument(order.instrument));
        }
        match order.side {
            Side::Sell => self.place_sell(order),
            Side::Buy => self.place_buy(order).await,
        }
    }

    fn build_order(&self, request: &PlaceRequest) -> Order {
        let id = self.order_ids.next();
        let now = unix_millis();
        Order {
            id,
            account: request.account,
            instrument: request.instrument,
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            price: request.price,
            status: OrderStatus::InProgress,
            created_at: now,
            parent: None,
            trade: None,
        }
    }

    fn place_sell(&self, order: Order) -> Result<PlaceOutcome, PlaceError> {
        // Reserve inventory first so a resting sell can never oversell.
        match self
            .ledger
            .reserve_position(order.account, order.instrument, order.quantity)
        {
            Ok(()) => {}
            Err(LedgerError::InsufficientInventory {
                account,
                instrument,
                held,
                requested,
            }) => {
                return Err(PlaceError::InsufficientInventory {
                    account,
                    instrument,
                    held,
                    requested,
                })
            }
            Err(err) => return Err(PlaceError::Unavailable(err.to_string())),
        }

        if let Err(err) = self.log.insert(order.clone()) {
            self.ledger
                .credit_position(order.account, order.instrument, order.quantity);
            return Err(PlaceError::Unavailable(err.to_string()));
        }

        let book = self
            .books
            .book(order.instrument)
            .ok_or(PlaceError::UnknownInstrument(order.instrument))?;
        {
            let mut book = book.lock().expect("lock");
            if let Err(err) = book.insert(&order) {
                self.ledger
                    .credit_position(order.account, order.instrument, order.quantity);
                let _ = self
                    .log
                    .update(order.id, OrderUpdate::status(OrderStatus::Cancelled));
                return Err(PlaceError::Unavailable(err.to_string()));
            }
        }

        info!(
            "sell rested order_id={} account={} instrument={} quantity={} price={:?}",
            order.id.0, order.account.0, order.instrument.0, order.quantity, order.price
        );
        self.audit.emit(&AuditEvent::now(
            order.account.0.to_string(),
            "order_place",
            Some(serde_json::json!({
                "order_id": order.id.0,
                "instrument": order.instrument.0,
                "side": "sell",
            })),
            "success",
        ));
        Ok(PlaceOutcome::Rested { order_id: order.id })
    }

    async fn place_buy(&self, order: Order) -> Result<PlaceOutcome, PlaceError> {
        self.log
            .insert(order.clone())
            .map_err(|err| PlaceError::Unavailable(err.to_string()))?;

        let receiver = self.correlator.register(order.id);
        if let Err(err) = self.broker.publish(MatchRequest { order: order.clone() }) {
            self.correlator.forget(order.id);
            let _ = self
                .log
                .update(order.id, OrderUpdate::status(OrderStatus::Cancelled));
            return Err(PlaceError::Unavailable(err.to_string()));
        }
        info!(
            "buy dispatched order_id={} account={} instrument={} quantity={}",
            order.id.0, order.account.0, order.instrument.0, order.quantity
        );

        match tokio::time::timeout(self.match_timeout, receiver).await {
            Ok(Ok(result)) => {
                let outcome = match result.outcome {
                    MatchOutcome::Matched { price, quantity, trade } => PlaceOutcome::Filled {
                        order_id: order.id,
                        price,
                        quantity,
                        trade,
                    },
                    MatchOutcome::Unmatched { reason } => PlaceOutcome::Unfilled {
                        order_id: order.id,
                        reason,
                    },
                };
                self.audit.emit(&AuditEvent::now(
                    order.account.0.to_string(),
                    "match_result",
                    Some(serde_json::json!({ "order_id": order.id.0 })),
                    match &outcome {
                        PlaceOutcome::Filled { .. } => "success",
                        _ => "unmatched",
                    },
                ));
                Ok(outcome)
            }
            // Worker pool gone before producing a result.
            Ok(Err(_closed)) => Err(PlaceError::Unavailable(
                "matching pipeline closed before a result arrived".into(),
            )),
            Err(_elapsed) => {
                self.correlator.forget(order.id);
                warn!(
                    "match timeout order_id={} after {:?}; order stays in progress",
                    order.id.0, self.match_timeout
                );
                Ok(PlaceOutcome::TimedOut { order_id: order.id })
            }
        }
    }

    /// Cancels a resting sell. Only legal while `InProgress` and only by the
    /// owning account; loses a race against matching deterministically.
    pub fn cancel(&self, account: AccountId, order_id: OrderId) -> Result<(), CancelError> {
        let order = self
            .log
            .find_by_id(order_id)
            .map_err(|err| CancelError::Unavailable(err.to_string()))?
            .ok_or(CancelError::NotFound(order_id))?;
        if order.account != account {
            return Err(CancelError::WrongAccount(order_id));
        }
        match order.status {
            OrderStatus::Cancelled => return Err(CancelError::AlreadyCancelled(order_id)),
            OrderStatus::Completed | OrderStatus::PartiallyFilled => {
                return Err(CancelError::AlreadyMatched {
                    order_id,
                    status: order.status,
                })
            }
            OrderStatus::InProgress => {}
        }
        if order.is_buy() {
            // An in-progress buy is mid-pipeline; its outcome belongs to the
            // matching workers.
            return Err(CancelError::InFlight(order_id));
        }

        let book = self
            .books
            .book(order.instrument)
            .ok_or_else(|| CancelError::Unavailable("book missing".into()))?;
        let removed = {
            let mut book = book.lock().expect("lock");
            book.remove(order_id)
        };
        let Some(entry) = removed else {
            // The per-instrument exclusive scope already handed the entry to a
            // match; the fill wins.
            return Err(CancelError::AlreadyMatched {
                order_id,
                status: order.status,
            });
        };

        self.ledger
            .credit_position(entry.account, order.instrument, entry.quantity);
        if let Err(err) = self
            .log
            .update(order_id, OrderUpdate::status(OrderStatus::Cancelled))
        {
            warn!("cancelled order_id={} but log update failed: {}", order_id.0, err);
        }
        info!(
            "cancelled order_id={} account={} released={} instrument={}",
            order_id.0, account.0, entry.quantity, order.instrument.0
        );
        self.audit.emit(&AuditEvent::now(
            account.0.to_string(),
            "order_cancel",
            Some(serde_json::json!({ "order_id": order_id.0 })),
            "success",
        ));
        Ok(())
    }
}
