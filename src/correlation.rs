//! Response correlation: links an asynchronous match result back to the
//! synchronous caller awaiting it, keyed by the buy order's id.
//!
//! A result published after its caller stopped waiting (timeout) is retained
//! in the unclaimed map — an order dispatched to matching always has a single
//! well-defined outcome, whether or not anyone is still listening.

use crate::types::{MatchResult, OrderId};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct Correlator {
    waiters: Mutex<HashMap<OrderId, oneshot::Sender<MatchResult>>>,
    unclaimed: Mutex<HashMap<OrderId, MatchResult>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the order's result. At most one waiter per
    /// order; a second registration replaces the first.
    pub fn register(&self, order_id: OrderId) -> oneshot::Receiver<MatchResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().expect("lock").insert(order_id, tx);
        rx
    }

    /// Delivers a result to its waiter, or retains it unclaimed if the waiter
    /// is gone (timed out or never registered).
    pub fn publish(&self, result: MatchResult) {
        let waiter = self.waiters.lock().expect("lock").remove(&result.order_id);
        match waiter {
            Some(tx) => {
                if let Err(result) = tx.send(result) {
                    // Receiver dropped between timeout and forget.
                    self.unclaimed
                        .lock()
                        .expect("lock")
                        .insert(result.order_id, result);
                }
            }
            None => {
                self.unclaimed
                    .lock()
                    .expect("lock")
                    .insert(result.order_id, result);
            }
        }
    }

    /// Drops the waiter after a caller-side timeout. The in-flight match, if
    /// any, still completes and its result lands in the unclaimed map.
    pub fn forget(&self, order_id: OrderId) {
        self.waiters.lock().expect("lock").remove(&order_id);
    }

    /// Claims a retained result for out-of-band reconciliation.
    pub fn take_unclaimed(&self, order_id: OrderId) -> Option<MatchResult> {
        self.unclaimed.lock().expect("lock").remove(&order_id)
    }
}
