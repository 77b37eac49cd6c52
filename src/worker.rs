//! Matching worker pool: a small fixed set of tasks per instrument.
//!
//! Loop: dequeue → idempotency check → match under the instrument's book lock
//! → publish the correlated result → acknowledge. Acknowledging only after the
//! result is published means a worker that dies mid-flight leaves the request
//! unacked; the broker redelivers it and the retry re-evaluates whatever book
//! and ledger state exists then.

use crate::audit::AuditSink;
use crate::broker::{Delivery, MatchBroker};
use crate::correlation::Correlator;
use crate::ledger::Ledger;
use crate::matching::match_buy;
use crate::order_book::BookStore;
use crate::order_log::OrderLog;
use crate::types::{
    unix_millis, InstrumentId, MatchOutcome, MatchResult, Order, OrderIdSource, OrderStatus,
    UnmatchedReason,
};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared handles a worker needs. Explicitly constructed and injected;
/// lifecycle belongs to the engine, not to module globals.
pub struct WorkerContext {
    pub books: Arc<BookStore>,
    pub ledger: Arc<Ledger>,
    pub log: Arc<dyn OrderLog>,
    pub audit: Arc<dyn AuditSink>,
    pub correlator: Arc<Correlator>,
    pub order_ids: Arc<OrderIdSource>,
}

/// Spawns `count` workers consuming the instrument's queue. The handles stop
/// when `shutdown` flips to `true`.
pub fn spawn_workers(
    instrument: InstrumentId,
    count: usize,
    broker: &MatchBroker,
    ctx: Arc<WorkerContext>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(count);
    for worker in 0..count {
        let Some(consumer) = broker.consumer(instrument) else {
            warn!("no queue for instrument={}, worker not started", instrument.0);
            break;
        };
        let ctx = Arc::clone(&ctx);
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            info!("worker {} up for instrument={}", worker, instrument.0);
            loop {
                let delivery = tokio::select! {
                    changed = shutdown.changed() => {
                        // Stop on signal or on a dropped engine.
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                    delivery = consumer.recv() => delivery,
                };
                process(&ctx, delivery);
            }
            info!("worker {} down for instrument={}", worker, instrument.0);
        }));
    }
    handles
}

/// Handles one delivery end-to-end. Publishes exactly one result and acks.
fn process(ctx: &WorkerContext, delivery: Delivery) {
    let order = delivery.request().order.clone();

    // At-least-once delivery: a redelivered request whose order already
    // reached a terminal state must republish the recorded outcome instead of
    // matching again (matching again could settle twice).
    match ctx.log.find_by_id(order.id) {
        Ok(Some(stored)) if stored.status.is_terminal() => {
            info!(
                "redelivered order_id={} already {:?}, republishing outcome",
                order.id.0, stored.status
            );
            ctx.correlator.publish(MatchResult {
                order_id: order.id,
                outcome: outcome_of_resolved(&stored),
            });
            delivery.ack();
            return;
        }
        Ok(_) => {}
        Err(err) => {
            // Leave the delivery unacked; the log may recover by redelivery time.
            warn!("order log unavailable for order_id={}: {}", order.id.0, err);
            return;
        }
    }

    let Some(book) = ctx.books.book(order.instrument) else {
        warn!(
            "no book for instrument={}, order_id={} unmatched",
            order.instrument.0, order.id.0
        );
        ctx.correlator.publish(MatchResult {
            order_id: order.id,
            outcome: MatchOutcome::Unmatched { reason: UnmatchedReason::NoLiquidity },
        });
        delivery.ack();
        return;
    };

    let outcome = {
        let mut book = book.lock().expect("lock");
        match_buy(
            &mut book,
            &ctx.ledger,
            ctx.log.as_ref(),
            ctx.audit.as_ref(),
            &ctx.order_ids,
            &order,
            unix_millis(),
        )
    };

    ctx.correlator.publish(MatchResult {
        order_id: order.id,
        outcome,
    });
    delivery.ack();
}

/// Reconstructs the published outcome of an already-resolved order.
fn outcome_of_resolved(stored: &Order) -> MatchOutcome {
    match (stored.status, stored.price, stored.trade) {
        (OrderStatus::Completed, Some(price), Some(trade)) => MatchOutcome::Matched {
            price,
            quantity: stored.quantity,
            trade,
        },
        _ => MatchOutcome::Unmatched { reason: UnmatchedReason::AlreadyCancelled },
    }
}
