//! In-process match-request broker: one queue per instrument,
//! publish / consume-with-acknowledge, at-least-once delivery.
//!
//! A [`Delivery`] dropped without [`Delivery::ack`] is requeued at the front of
//! its instrument's queue, so a worker that dies mid-flight causes redelivery
//! rather than loss. Matching must therefore stay idempotent under retry.

use crate::error::BrokerError;
use crate::types::{InstrumentId, MatchRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct InstrumentQueue {
    pending: Mutex<VecDeque<MatchRequest>>,
    notify: Notify,
}

impl InstrumentQueue {
    fn push_back(&self, request: MatchRequest) {
        self.pending.lock().expect("lock").push_back(request);
        self.notify.notify_one();
    }

    fn push_front(&self, request: MatchRequest) {
        self.pending.lock().expect("lock").push_front(request);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<MatchRequest> {
        self.pending.lock().expect("lock").pop_front()
    }
}

/// One consumed request. Call [`Delivery::ack`] once the correlated result is
/// published; dropping without ack requeues the request.
#[derive(Debug)]
pub struct Delivery {
    request: Option<MatchRequest>,
    queue: Arc<InstrumentQueue>,
}

impl Delivery {
    pub fn request(&self) -> &MatchRequest {
        self.request.as_ref().expect("delivery already acked")
    }

    /// Marks the request as processed; it will not be redelivered.
    pub fn ack(mut self) {
        self.request = None;
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.queue.push_front(request);
        }
    }
}

/// Consumer handle for one instrument's queue. Cheap to clone per worker.
#[derive(Clone, Debug)]
pub struct MatchConsumer {
    queue: Arc<InstrumentQueue>,
}

impl MatchConsumer {
    /// Waits for the next request. Cancellation-safe: a request is only taken
    /// out of the queue when a `Delivery` is actually returned.
    pub async fn recv(&self) -> Delivery {
        loop {
            if let Some(request) = self.queue.pop() {
                return Delivery {
                    request: Some(request),
                    queue: Arc::clone(&self.queue),
                };
            }
            self.queue.notify.notified().await;
        }
    }
}

/// Broker over all instrument queues. Dependency-injected into intake and the
/// worker pools; never a module-level global.
#[derive(Debug, Default)]
pub struct MatchBroker {
    queues: RwLock<HashMap<InstrumentId, Arc<InstrumentQueue>>>,
}

impl MatchBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the queue for an instrument. Returns `false` if one exists.
    pub fn register(&self, instrument: InstrumentId) -> bool {
        let mut queues = self.queues.write().expect("lock");
        if queues.contains_key(&instrument) {
            return false;
        }
        queues.insert(instrument, Arc::new(InstrumentQueue::default()));
        true
    }

    /// Routes a request to its instrument's queue.
    pub fn publish(&self, request: MatchRequest) -> Result<(), BrokerError> {
        let instrument = request.order.instrument;
        let queues = self.queues.read().expect("lock");
        let queue = queues
            .get(&instrument)
            .ok_or(BrokerError::UnknownInstrument(instrument))?;
        queue.push_back(request);
        Ok(())
    }

    /// A consumer for the instrument's queue, if registered.
    pub fn consumer(&self, instrument: InstrumentId) -> Option<MatchConsumer> {
        self.queues
            .read()
            .expect("lock")
            .get(&instrument)
            .map(|queue| MatchConsumer { queue: Arc::clone(queue) })
    }

    /// Pending (unconsumed) requests for an instrument.
    pub fn depth(&self, instrument: InstrumentId) -> usize {
        self.queues
            .read()
            .expect("lock")
            .get(&instrument)
            .map(|q| q.pending.lock().expect("lock").len())
            .unwrap_or(0)
    }
}
