//! Fan-out subscriptions.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use bus_types::Envelope;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_stream::Stream;
use tracing::debug;

use super::bus::FanOutInner;
use crate::error::SubscriptionError;

/// Counters shared between a subscription and the bus that feeds it.
#[derive(Debug, Default)]
pub(super) struct SubscriptionCounters {
    delivered: AtomicU64,
    overflow: AtomicU64,
}

impl SubscriptionCounters {
    pub(super) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_overflow(&self) {
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-subscription counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub delivered: u64,
    pub overflow: u64,
}

/// One subscriber's bounded queue on a [`FanOutBus`](super::FanOutBus).
///
/// Dropping the subscription removes it from the bus.
pub struct FanOutSubscription<P> {
    id: u64,
    receiver: mpsc::Receiver<Arc<Envelope<P>>>,
    counters: Arc<SubscriptionCounters>,
    bus: Weak<FanOutInner<P>>,
    closed: bool,
}

impl<P> FanOutSubscription<P> {
    pub(super) fn new(
        id: u64,
        receiver: mpsc::Receiver<Arc<Envelope<P>>>,
        counters: Arc<SubscriptionCounters>,
        bus: Weak<FanOutInner<P>>,
    ) -> Self {
        Self {
            id,
            receiver,
            counters,
            bus,
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next envelope.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(envelope))`: the next envelope in publish order
    /// - `Ok(None)`: `timeout` elapsed with nothing queued
    /// - `Err(SubscriptionError::Closed)`: this subscription or its bus was
    ///   closed and nothing is left to read
    pub async fn get(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<Arc<Envelope<P>>>, SubscriptionError> {
        if self.closed {
            return Err(SubscriptionError::Closed);
        }

        let next = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.receiver.recv()).await {
                Ok(next) => next,
                Err(_elapsed) => return Ok(None),
            },
            None => self.receiver.recv().await,
        };

        match next {
            Some(envelope) => Ok(Some(envelope)),
            None => {
                self.closed = true;
                Err(SubscriptionError::Closed)
            }
        }
    }

    /// Wait without a timeout. `None` once closed.
    pub async fn recv(&mut self) -> Option<Arc<Envelope<P>>> {
        self.get(None).await.ok().flatten()
    }

    /// Take the next envelope if one is queued.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(envelope))`: an envelope was queued
    /// - `Ok(None)`: the queue is empty (would block)
    /// - `Err(SubscriptionError::Closed)`: closed and drained
    pub fn try_get(&mut self) -> Result<Option<Arc<Envelope<P>>>, SubscriptionError> {
        if self.closed {
            return Err(SubscriptionError::Closed);
        }
        match self.receiver.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Err(SubscriptionError::Closed)
            }
        }
    }

    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            overflow: self.counters.overflow.load(Ordering::Relaxed),
        }
    }

    /// Number of envelopes waiting in the queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// True once `close()` was called or the bus closed and the queue drained.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close this subscription only. Terminal: queued envelopes are
    /// discarded and every later read reports closed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.detach();
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }

    /// Consume the subscription as a [`Stream`] that ends on close.
    pub fn into_stream(self) -> FanOutStream<P> {
        FanOutStream { subscription: self }
    }

    fn detach(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.deregister(self.id);
        }
    }
}

impl<P> Drop for FanOutSubscription<P> {
    fn drop(&mut self) {
        self.detach();
        debug!(subscription = self.id, "Fan-out subscription dropped");
    }
}

impl<P> std::fmt::Debug for FanOutSubscription<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutSubscription")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Stream adapter over a [`FanOutSubscription`].
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct FanOutStream<P> {
    subscription: FanOutSubscription<P>,
}

impl<P> FanOutStream<P> {
    pub fn stats(&self) -> SubscriptionStats {
        self.subscription.stats()
    }

    /// Close the underlying subscription; the stream then ends.
    pub fn close(&mut self) {
        self.subscription.close();
    }
}

impl<P> Stream for FanOutStream<P> {
    type Item = Arc<Envelope<P>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let subscription = &mut self.subscription;
        if subscription.closed {
            return Poll::Ready(None);
        }
        match subscription.receiver.poll_recv(cx) {
            Poll::Ready(None) => {
                subscription.closed = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
