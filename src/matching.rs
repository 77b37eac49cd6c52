//! The matching algorithm: one market buy against one instrument's book.
//!
//! A buy either clears against the single best resting sell or fails outright;
//! the venue never sweeps price levels to assemble a fill. Partial consumption
//! of the resting sell splits it into a completed child order (the filled
//! slice) and a reduced remainder that keeps its time priority.
//!
//! Ordering is deliberate: depth check, then settlement (which performs the
//! funds check and fails cleanly), then the book mutation, then the durable
//! log transitions. A funds failure therefore leaves the book untouched. The
//! caller must hold the instrument's book lock for the whole call.

use crate::audit::{AuditEvent, AuditSink};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::order_book::OrderBook;
use crate::order_log::{OrderLog, OrderUpdate};
use crate::types::{
    MatchOutcome, Order, OrderIdSource, OrderKind, OrderStatus, Side, UnmatchedReason,
};
use log::{error, info, warn};

/// Runs one match attempt for `buy`. Returns the outcome; all book, ledger,
/// and order-log effects have been applied when this returns.
pub fn match_buy(
    book: &mut OrderBook,
    ledger: &Ledger,
    log: &dyn OrderLog,
    audit: &dyn AuditSink,
    order_ids: &OrderIdSource,
    buy: &Order,
    now: u64,
) -> MatchOutcome {
    let Some(best) = book.peek_best() else {
        info!("no liquidity for order_id={} instrument={}", buy.id.0, buy.instrument.0);
        return cancel_unmatched(log, buy, UnmatchedReason::NoLiquidity);
    };
    let best = best.clone();

    if best.quantity < buy.quantity {
        info!(
            "insufficient depth for order_id={} best_quantity={} buy_quantity={}",
            buy.id.0, best.quantity, buy.quantity
        );
        return cancel_unmatched(log, buy, UnmatchedReason::InsufficientDepth);
    }

    let price = best.price;
    let trade = match ledger.settle(buy.account, best.account, buy.instrument, buy.quantity, price, now)
    {
        Ok(trade) => trade,
        Err(LedgerError::InsufficientFunds { required, available, .. }) => {
            info!(
                "insufficient funds for order_id={} required={} available={}",
                buy.id.0, required, available
            );
            return cancel_unmatched(log, buy, UnmatchedReason::InsufficientFunds);
        }
        Err(err) => {
            warn!("settlement refused for order_id={}: {}", buy.id.0, err);
            return cancel_unmatched(log, buy, UnmatchedReason::InsufficientFunds);
        }
    };

    // Settlement has committed; the book mutation and log transitions below
    // must all land. Failures past this point are escalated, never retried.
    if best.quantity > buy.quantity {
        let remainder = best.quantity - buy.quantity;
        book.remove_and_reduce(best.order_id, remainder);
        let child = Order {
            id: order_ids.next(),
            account: best.account,
            instrument: buy.instrument,
            side: Side::Sell,
            kind: OrderKind::Limit,
            quantity: buy.quantity,
            price: Some(price),
            status: OrderStatus::Completed,
            created_at: now,
            parent: Some(best.order_id),
            trade: Some(trade),
        };
        let child_id = child.id;
        if let Err(err) = log.insert(child) {
            escalate(audit, buy, "child order insert failed", &err.to_string());
        }
        if let Err(err) = log.update(
            best.order_id,
            OrderUpdate::status(OrderStatus::PartiallyFilled).with_quantity(remainder),
        ) {
            escalate(audit, buy, "partial-fill update failed", &err.to_string());
        }
        info!(
            "partial fill sell_order={} child_order={} executed={} remainder={} price={}",
            best.order_id.0, child_id.0, buy.quantity, remainder, price
        );
    } else {
        book.remove_and_reduce(best.order_id, 0);
        if let Err(err) = log.update(
            best.order_id,
            OrderUpdate::status(OrderStatus::Completed).with_execution(price, trade),
        ) {
            escalate(audit, buy, "sell completion update failed", &err.to_string());
        }
        info!(
            "full fill sell_order={} executed={} price={}",
            best.order_id.0, buy.quantity, price
        );
    }

    if let Err(err) = log.update(
        buy.id,
        OrderUpdate::status(OrderStatus::Completed).with_execution(price, trade),
    ) {
        escalate(audit, buy, "buy completion update failed", &err.to_string());
    }
    info!(
        "matched order_id={} quantity={} price={} trade={}",
        buy.id.0, buy.quantity, price, trade.0
    );

    MatchOutcome::Matched {
        price,
        quantity: buy.quantity,
        trade,
    }
}

/// Applies the unmatched policy: the buy is cancelled (nothing was debited, so
/// nothing is refunded) and the reason is reported to the caller.
fn cancel_unmatched(log: &dyn OrderLog, buy: &Order, reason: UnmatchedReason) -> MatchOutcome {
    if let Err(err) = log.update(buy.id, OrderUpdate::status(OrderStatus::Cancelled)) {
        warn!(
            "failed to cancel unmatched order_id={}: {}",
            buy.id.0, err
        );
    }
    MatchOutcome::Unmatched { reason }
}

/// A trade settled but its durable record could not be completed. The ledger
/// and the order log now disagree; retrying could double-settle, so this is
/// surfaced for manual reconciliation instead.
fn escalate(audit: &dyn AuditSink, buy: &Order, what: &str, detail: &str) {
    error!(
        "settlement inconsistency on order_id={}: {}: {}",
        buy.id.0, what, detail
    );
    audit.emit(&AuditEvent::now(
        "matching",
        "settlement_inconsistency",
        Some(serde_json::json!({
            "order_id": buy.id.0,
            "instrument": buy.instrument.0,
            "what": what,
            "detail": detail,
        })),
        "error",
    ));
}
