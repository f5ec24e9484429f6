//! # Storage Bus
//!
//! Type-filtered pub/sub for committed storage mutations, with replay.
//!
//! ## Contract
//!
//! - Producers call [`StorageBus::emit`] *after* their mutation commits.
//! - `emit` appends to the replay buffer, then enqueues the envelope for every
//!   matching handler. It never waits for a handler to run.
//! - A handler error or panic is logged and counted; it never reaches the
//!   producer or other handlers.
//! - Each handler registered at emit time receives the envelope exactly once.
//!   There is no retry, and an envelope whose id was already emitted on this
//!   bus is rejected, hence no duplicates.
//! - A late subscriber catches up with [`StorageBus::replay`] or
//!   [`StorageBus::replay_to`] before relying on live delivery.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bus_types::{StorageEnvelope, StorageEvent, StorageEventType};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatch::{panic_message, Deregister, Registry, SlotMeta, SubscriptionHandle, WorkerPool};
use crate::publisher::EventPublisher;
use crate::replay::ReplayBuffer;
use crate::dedup::RecentIds;
use crate::{DEFAULT_DEDUP_WINDOW, DEFAULT_REPLAY_CAPACITY};

const BUS_NAME: &str = "storage";

/// Subscriber to storage mutations.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Process one envelope.
    async fn handle(&self, envelope: Arc<StorageEnvelope>) -> anyhow::Result<()>;
}

/// [`StorageHandler`] backed by an async closure.
pub struct FnStorageHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> StorageHandler for FnStorageHandler<F>
where
    F: Fn(Arc<StorageEnvelope>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<StorageEnvelope>) -> anyhow::Result<()> {
        (self.func)(envelope).await
    }
}

/// Wrap an async closure as a storage handler.
pub fn storage_handler<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn StorageHandler>
where
    F: Fn(Arc<StorageEnvelope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnStorageHandler {
        name: name.into(),
        func,
    })
}

/// Counters shared between the bus and its workers.
#[derive(Debug, Default)]
struct StorageCounters {
    emitted: AtomicU64,
    handled: AtomicU64,
    failures: AtomicU64,
    duplicates: AtomicU64,
}

/// Storage-level event bus.
pub struct StorageBus {
    registry: Arc<Registry<StorageEventType, Arc<StorageEnvelope>>>,
    buffer: ReplayBuffer<StorageEvent>,
    recent: RecentIds,
    workers: WorkerPool,
    counters: Arc<StorageCounters>,
}

impl StorageBus {
    /// Create a bus whose replay buffer holds the default 1000 envelopes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Create a bus whose replay buffer holds `replay_capacity` envelopes.
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            buffer: ReplayBuffer::with_capacity(replay_capacity),
            recent: RecentIds::with_capacity(replay_capacity.max(DEFAULT_DEDUP_WINDOW)),
            workers: WorkerPool::new(BUS_NAME),
            counters: Arc::new(StorageCounters::default()),
        }
    }

    /// Subscribe `handler` to one event type.
    ///
    /// Must be called from within a Tokio runtime (a worker task is spawned).
    pub fn subscribe(
        &self,
        kind: StorageEventType,
        handler: Arc<dyn StorageHandler>,
    ) -> SubscriptionHandle {
        self.register(Some(kind), handler)
    }

    /// Subscribe `handler` to every event type.
    pub fn subscribe_all(&self, handler: Arc<dyn StorageHandler>) -> SubscriptionHandle {
        self.register(None, handler)
    }

    fn register(
        &self,
        kind: Option<StorageEventType>,
        handler: Arc<dyn StorageHandler>,
    ) -> SubscriptionHandle {
        let (meta, receiver) = self.registry.register(kind, handler.name().to_string());
        debug!(bus = BUS_NAME, handler = meta.name(), kind = ?kind, "Handler subscribed");

        self.workers.spawn(run_worker(
            Arc::clone(&meta),
            handler,
            receiver,
            Arc::clone(&self.counters),
        ));

        let registry: Weak<dyn Deregister> = Arc::downgrade(&self.registry) as Weak<dyn Deregister>;
        SubscriptionHandle::new(&meta, registry)
    }

    /// Record `envelope` for replay and schedule every matching handler.
    ///
    /// # Returns
    ///
    /// The number of handlers the envelope was scheduled for. A repeated
    /// envelope id is rejected with 0 and is neither buffered nor delivered.
    pub fn emit(&self, envelope: StorageEnvelope) -> usize {
        if !self.recent.admit(envelope.id()) {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            bus_telemetry::DUPLICATES_REJECTED
                .with_label_values(&[BUS_NAME])
                .inc();
            warn!(bus = BUS_NAME, event_id = %envelope.id(), "Duplicate envelope rejected");
            return 0;
        }

        let envelope = Arc::new(envelope);
        let kind = envelope.kind();

        self.buffer.append(Arc::clone(&envelope));
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        bus_telemetry::EVENTS_EMITTED
            .with_label_values(&[BUS_NAME, &kind.to_string()])
            .inc();

        let targets = self.registry.snapshot(kind);
        let scheduled = targets
            .iter()
            .filter(|slot| slot.enqueue(Arc::clone(&envelope)))
            .count();

        debug!(
            bus = BUS_NAME,
            event_id = %envelope.id(),
            kind = %kind,
            source = envelope.source(),
            scheduled,
            "Storage event emitted"
        );
        scheduled
    }

    /// Deliver buffered envelopes to a synchronous callback.
    ///
    /// Envelopes with `timestamp >= since` (all if `None`) and matching
    /// `kind` (all if `None`) are delivered oldest first.
    ///
    /// # Returns
    ///
    /// The number of envelopes delivered.
    pub fn replay<F>(
        &self,
        since: Option<DateTime<Utc>>,
        kind: Option<StorageEventType>,
        handler: F,
    ) -> usize
    where
        F: FnMut(&Arc<StorageEnvelope>),
    {
        self.buffer.replay(since, kind, handler)
    }

    /// Deliver buffered envelopes to an async handler, one at a time.
    ///
    /// Used by a restarting consumer: replay from its last seen timestamp,
    /// then switch to a live subscription. Handler failures are logged and
    /// do not stop the replay.
    pub async fn replay_to(
        &self,
        handler: &dyn StorageHandler,
        since: Option<DateTime<Utc>>,
        kind: Option<StorageEventType>,
    ) -> usize {
        let snapshot = self.buffer.matching(since, kind);
        for envelope in &snapshot {
            if let Err(err) = handler.handle(Arc::clone(envelope)).await {
                warn!(
                    bus = BUS_NAME,
                    handler = handler.name(),
                    event_id = %envelope.id(),
                    error = %err,
                    "Handler failed during replay"
                );
            }
        }
        snapshot.len()
    }

    /// The replay buffer backing this bus.
    pub fn buffer(&self) -> &ReplayBuffer<StorageEvent> {
        &self.buffer
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Total envelopes emitted.
    pub fn events_emitted(&self) -> u64 {
        self.counters.emitted.load(Ordering::Relaxed)
    }

    /// Envelopes rejected because their id was already emitted.
    pub fn duplicates_rejected(&self) -> u64 {
        self.counters.duplicates.load(Ordering::Relaxed)
    }

    /// Total handler invocations that completed (successfully or not).
    pub fn events_handled(&self) -> u64 {
        self.counters.handled.load(Ordering::Relaxed)
    }

    /// Total handler invocations that errored or panicked.
    pub fn handler_failures(&self) -> u64 {
        self.counters.failures.load(Ordering::Relaxed)
    }

    /// Drop every registration and abort every worker.
    ///
    /// Queued but unprocessed envelopes are abandoned. Nothing is raised
    /// into the caller. The replay buffer is kept.
    pub fn shutdown(&self) {
        let handlers = self.registry.clear();
        let workers = self.workers.shutdown();
        info!(bus = BUS_NAME, handlers, workers, "Storage bus shut down");
    }
}

impl Default for StorageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher<StorageEvent> for StorageBus {
    async fn publish(&self, envelope: StorageEnvelope) -> usize {
        self.emit(envelope)
    }

    fn events_published(&self) -> u64 {
        self.events_emitted()
    }
}

async fn run_worker(
    meta: Arc<SlotMeta>,
    handler: Arc<dyn StorageHandler>,
    mut receiver: mpsc::UnboundedReceiver<Arc<StorageEnvelope>>,
    counters: Arc<StorageCounters>,
) {
    while let Some(envelope) = receiver.recv().await {
        if !meta.is_active() {
            break;
        }

        let outcome = {
            let _timer = bus_telemetry::time_handler(BUS_NAME);
            AssertUnwindSafe(handler.handle(Arc::clone(&envelope)))
                .catch_unwind()
                .await
        };
        counters.handled.fetch_add(1, Ordering::Relaxed);

        let failed = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(err)) => {
                warn!(
                    bus = BUS_NAME,
                    handler = meta.name(),
                    event_id = %envelope.id(),
                    error = %err,
                    "Storage handler failed"
                );
                true
            }
            Err(panic) => {
                error!(
                    bus = BUS_NAME,
                    handler = meta.name(),
                    event_id = %envelope.id(),
                    panic = %panic_message(panic.as_ref()),
                    "Storage handler panicked"
                );
                true
            }
        };

        if failed {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            bus_telemetry::HANDLER_FAILURES
                .with_label_values(&[BUS_NAME, meta.name()])
                .inc();
        }
    }
    debug!(bus = BUS_NAME, handler = meta.name(), "Storage worker stopped");
}
