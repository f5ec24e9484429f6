//! Fan-out bus and its subscriber registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bus_types::Envelope;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::subscription::{FanOutSubscription, SubscriptionCounters};
use crate::dedup::RecentIds;
use crate::error::BusError;
use crate::publisher::EventPublisher;
use crate::DEFAULT_FANOUT_CAPACITY;

/// Bus-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutStats {
    /// Envelopes published while the bus was open.
    pub published: u64,
    /// Successful per-subscriber enqueues.
    pub delivered: u64,
    /// Per-subscriber drops on a full queue.
    pub overflow: u64,
    /// Envelopes rejected because their id was already published.
    pub duplicates: u64,
    /// Currently open subscriptions.
    pub subscribers: usize,
}

struct SubscriberSlot<P> {
    sender: mpsc::Sender<Arc<Envelope<P>>>,
    counters: Arc<SubscriptionCounters>,
}

impl<P> Clone for SubscriberSlot<P> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

pub(super) struct FanOutInner<P> {
    subscribers: Mutex<BTreeMap<u64, SubscriberSlot<P>>>,
    closed: AtomicBool,
    capacity: usize,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    overflow: AtomicU64,
    recent: RecentIds,
    duplicates: AtomicU64,
}

impl<P> FanOutInner<P> {
    /// Drop a subscriber's sender. Returns false if it was already gone.
    pub(super) fn deregister(&self, id: u64) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscription = id, "Fan-out subscription removed");
        }
        removed
    }
}

/// Multi-subscriber broadcast bus for envelopes of payload `P`.
///
/// Cloning yields another handle to the same bus.
pub struct FanOutBus<P> {
    inner: Arc<FanOutInner<P>>,
}

impl<P> Clone for FanOutBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> FanOutBus<P>
where
    P: Send + Sync + 'static,
{
    /// Create a bus whose subscriptions hold up to the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FANOUT_CAPACITY)
    }

    /// Create a bus whose subscriptions hold up to `capacity` envelopes
    /// (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(FanOutInner {
                subscribers: Mutex::new(BTreeMap::new()),
                closed: AtomicBool::new(false),
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                overflow: AtomicU64::new(0),
                recent: RecentIds::new(),
                duplicates: AtomicU64::new(0),
            }),
        }
    }

    /// Open a new subscription.
    ///
    /// # Errors
    ///
    /// [`BusError::Closed`] if the bus has been closed.
    pub fn subscribe(&self) -> Result<FanOutSubscription<P>, BusError> {
        let mut subscribers = self.inner.subscribers.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let counters = Arc::new(SubscriptionCounters::default());
        subscribers.insert(
            id,
            SubscriberSlot {
                sender,
                counters: Arc::clone(&counters),
            },
        );
        drop(subscribers);

        debug!(subscription = id, capacity = self.inner.capacity, "Fan-out subscription opened");
        Ok(FanOutSubscription::new(
            id,
            receiver,
            counters,
            Arc::downgrade(&self.inner),
        ))
    }

    /// Offer `envelope` to every open subscription without blocking.
    ///
    /// # Returns
    ///
    /// The number of subscriptions the envelope was enqueued for. Zero once
    /// the bus is closed, or when the envelope id was already published.
    pub fn publish(&self, envelope: Envelope<P>) -> usize {
        self.broadcast(Arc::new(envelope))
    }

    fn broadcast(&self, envelope: Arc<Envelope<P>>) -> usize {
        let targets: Vec<SubscriberSlot<P>> = {
            let subscribers = self.inner.subscribers.lock();
            if self.inner.closed.load(Ordering::Acquire) {
                debug!(event_id = %envelope.id(), "Publish on closed fan-out bus ignored");
                return 0;
            }
            if !self.inner.recent.admit(envelope.id()) {
                self.inner.duplicates.fetch_add(1, Ordering::Relaxed);
                bus_telemetry::DUPLICATES_REJECTED
                    .with_label_values(&["fanout"])
                    .inc();
                warn!(event_id = %envelope.id(), "Duplicate envelope rejected");
                return 0;
            }
            subscribers.values().cloned().collect()
        };
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0usize;
        for slot in &targets {
            match slot.sender.try_send(Arc::clone(&envelope)) {
                Ok(()) => {
                    delivered += 1;
                    slot.counters.record_delivered();
                }
                Err(TrySendError::Full(_)) => {
                    slot.counters.record_overflow();
                    self.inner.overflow.fetch_add(1, Ordering::Relaxed);
                    bus_telemetry::FANOUT_OVERFLOW.inc();
                }
                // Subscription closed after the snapshot.
                Err(TrySendError::Closed(_)) => {}
            }
        }

        self.inner.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        if delivered > 0 {
            bus_telemetry::FANOUT_DELIVERED.inc_by(delivered as f64);
        }
        delivered
    }

    /// Close the bus.
    ///
    /// Every subscription is released: a pending `get()` returns
    /// [`SubscriptionError::Closed`](crate::SubscriptionError::Closed) once
    /// its queue is drained. Later `subscribe()` calls fail. Idempotent and
    /// non-blocking.
    pub fn close(&self) {
        let released = {
            let mut subscribers = self.inner.subscribers.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *subscribers)
        };
        info!(subscriptions = released.len(), "Fan-out bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn stats(&self) -> FanOutStats {
        FanOutStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            overflow: self.inner.overflow.load(Ordering::Relaxed),
            duplicates: self.inner.duplicates.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

impl<P> Default for FanOutBus<P>
where
    P: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> std::fmt::Debug for FanOutBus<P>
where
    P: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutBus")
            .field("capacity", &self.inner.capacity)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

#[async_trait]
impl<P> EventPublisher<P> for FanOutBus<P>
where
    P: Send + Sync + 'static,
{
    async fn publish(&self, envelope: Envelope<P>) -> usize {
        self.broadcast(Arc::new(envelope))
    }

    fn events_published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}
