//! # Coordination Bus
//!
//! Named-handler pub/sub for cross-domain events.
//!
//! ## Operations
//!
//! - `register(kind, handler)` / `register_all(handler)`: handlers expose a
//!   name and an async `handle`.
//! - `emit(envelope)`: fire-and-forget; returns once handlers are scheduled.
//! - `emit_and_wait(envelope)`: schedules handlers and awaits one
//!   [`HandlerResult`] per handler, in registration order.
//! - `subscribe_results(observer)`: observe every `(envelope, result)` pair,
//!   whichever emission mode produced it.
//!
//! A handler that returns `Err` or panics yields a failed result with the
//! error text; it never aborts collection of other results.
//!
//! An envelope whose id this bus already accepted is rejected by both
//! emission modes: nothing is scheduled and no result is produced.
//!
//! A handler must not `emit_and_wait` an event that routes back to itself:
//! its own queue is blocked behind the current invocation.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bus_types::{CoordinationEnvelope, CoordinationEvent, CoordinationEventType, HandlerResult};
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dispatch::{panic_message, Deregister, Registry, SlotMeta, SubscriptionHandle, WorkerPool};
use crate::dedup::RecentIds;
use crate::publisher::EventPublisher;

const BUS_NAME: &str = "coordination";

/// Cross-domain event handler.
#[async_trait]
pub trait CoordinationHandler: Send + Sync {
    /// Handler name, reported in every [`HandlerResult`].
    fn name(&self) -> &str;

    /// Process one envelope. Prefer returning a failed result over `Err`.
    async fn handle(&self, envelope: Arc<CoordinationEnvelope>) -> anyhow::Result<HandlerResult>;
}

/// [`CoordinationHandler`] backed by an async closure.
pub struct FnCoordinationHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> CoordinationHandler for FnCoordinationHandler<F>
where
    F: Fn(Arc<CoordinationEnvelope>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<HandlerResult>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<CoordinationEnvelope>) -> anyhow::Result<HandlerResult> {
        (self.func)(envelope).await
    }
}

/// Wrap an async closure as a coordination handler.
pub fn coordination_handler<F, Fut>(
    name: impl Into<String>,
    func: F,
) -> Arc<dyn CoordinationHandler>
where
    F: Fn(Arc<CoordinationEnvelope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HandlerResult>> + Send + 'static,
{
    Arc::new(FnCoordinationHandler {
        name: name.into(),
        func,
    })
}

/// Observer of handler completions (observability, UI notification).
///
/// Called on the handler's worker task; keep it short and non-blocking.
pub trait ResultObserver: Send + Sync {
    fn on_result(&self, envelope: &CoordinationEnvelope, result: &HandlerResult);
}

impl<F> ResultObserver for F
where
    F: Fn(&CoordinationEnvelope, &HandlerResult) + Send + Sync,
{
    fn on_result(&self, envelope: &CoordinationEnvelope, result: &HandlerResult) {
        self(envelope, result)
    }
}

/// Registered result observers.
struct ObserverSet {
    observers: RwLock<Vec<(u64, Arc<dyn ResultObserver>)>>,
    next_id: AtomicU64,
}

impl ObserverSet {
    fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn add(&self, observer: Arc<dyn ResultObserver>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.write().push((id, observer));
        id
    }

    fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Notify a snapshot of observers; a panicking observer is logged and skipped.
    fn notify(&self, envelope: &CoordinationEnvelope, result: &HandlerResult) {
        let snapshot: Vec<Arc<dyn ResultObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                observer.on_result(envelope, result);
            }));
            if let Err(panic) = outcome {
                error!(
                    bus = BUS_NAME,
                    event_id = %envelope.id(),
                    panic = %panic_message(panic.as_ref()),
                    "Result observer panicked"
                );
            }
        }
    }
}

impl Deregister for ObserverSet {
    fn deregister(&self, id: u64) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }
}

/// Unit of work queued for one handler.
struct Dispatch {
    envelope: Arc<CoordinationEnvelope>,
    reply: Option<oneshot::Sender<HandlerResult>>,
}

/// Cross-domain coordination bus.
pub struct CoordinationBus {
    registry: Arc<Registry<CoordinationEventType, Dispatch>>,
    observers: Arc<ObserverSet>,
    workers: WorkerPool,
    recent: RecentIds,
    emitted: AtomicU64,
    duplicates: AtomicU64,
}

impl CoordinationBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            observers: Arc::new(ObserverSet::new()),
            workers: WorkerPool::new(BUS_NAME),
            recent: RecentIds::new(),
            emitted: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    /// Register `handler` for one event type.
    ///
    /// Handlers for the same type run concurrently and must not assume any
    /// ordering relative to each other. Must be called from within a Tokio
    /// runtime.
    pub fn register(
        &self,
        kind: CoordinationEventType,
        handler: Arc<dyn CoordinationHandler>,
    ) -> SubscriptionHandle {
        self.subscribe(Some(kind), handler)
    }

    /// Register `handler` for every event type.
    pub fn register_all(&self, handler: Arc<dyn CoordinationHandler>) -> SubscriptionHandle {
        self.subscribe(None, handler)
    }

    fn subscribe(
        &self,
        kind: Option<CoordinationEventType>,
        handler: Arc<dyn CoordinationHandler>,
    ) -> SubscriptionHandle {
        let (meta, receiver) = self.registry.register(kind, handler.name().to_string());
        debug!(bus = BUS_NAME, handler = meta.name(), kind = ?kind, "Handler registered");

        self.workers.spawn(run_worker(
            Arc::clone(&meta),
            handler,
            receiver,
            Arc::clone(&self.observers),
        ));

        let registry: Weak<dyn Deregister> = Arc::downgrade(&self.registry) as Weak<dyn Deregister>;
        SubscriptionHandle::new(&meta, registry)
    }

    /// Observe every handler completion.
    pub fn subscribe_results(&self, observer: Arc<dyn ResultObserver>) -> ObserverHandle {
        let id = self.observers.add(observer);
        let observers: Weak<dyn Deregister> = Arc::downgrade(&self.observers) as Weak<dyn Deregister>;
        ObserverHandle { id, observers }
    }

    /// Schedule every matching handler and return immediately.
    ///
    /// # Returns
    ///
    /// The number of handlers scheduled, 0 for a repeated envelope id.
    pub fn emit(&self, envelope: CoordinationEnvelope) -> usize {
        if !self.record_emit(&envelope) {
            return 0;
        }
        let envelope = Arc::new(envelope);

        let scheduled = self
            .registry
            .snapshot(envelope.kind())
            .iter()
            .filter(|slot| {
                slot.enqueue(Dispatch {
                    envelope: Arc::clone(&envelope),
                    reply: None,
                })
            })
            .count();

        debug!(
            bus = BUS_NAME,
            event_id = %envelope.id(),
            kind = %envelope.kind(),
            scheduled,
            "Coordination event emitted"
        );
        scheduled
    }

    /// Schedule every matching handler and wait for all of them.
    ///
    /// # Returns
    ///
    /// One result per handler registered at call time, in registration
    /// order. A handler that could not finish (bus shut down, or it was
    /// unsubscribed while the envelope was queued) yields a failed result.
    /// A repeated envelope id yields no results.
    pub async fn emit_and_wait(&self, envelope: CoordinationEnvelope) -> Vec<HandlerResult> {
        if !self.record_emit(&envelope) {
            return Vec::new();
        }
        let envelope = Arc::new(envelope);

        let targets = self.registry.snapshot(envelope.kind());
        let mut pending = Vec::with_capacity(targets.len());
        for slot in &targets {
            let (reply, receiver) = oneshot::channel();
            let queued = slot.enqueue(Dispatch {
                envelope: Arc::clone(&envelope),
                reply: Some(reply),
            });
            pending.push((slot.name().to_string(), queued.then_some(receiver)));
        }
        drop(targets);

        let mut results = Vec::with_capacity(pending.len());
        for (name, receiver) in pending {
            let result = match receiver {
                Some(receiver) => receiver.await.unwrap_or_else(|_| {
                    HandlerResult::failed(&name, "handler did not complete: bus shut down or handler removed")
                }),
                None => HandlerResult::failed(&name, "handler unavailable: unsubscribed before dispatch"),
            };
            results.push(result);
        }

        debug!(
            bus = BUS_NAME,
            event_id = %envelope.id(),
            results = results.len(),
            failures = results.iter().filter(|r| r.is_failure()).count(),
            "Coordination event completed"
        );
        results
    }

    /// Count an emission, or reject it if the id was already accepted.
    fn record_emit(&self, envelope: &CoordinationEnvelope) -> bool {
        if !self.recent.admit(envelope.id()) {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            bus_telemetry::DUPLICATES_REJECTED
                .with_label_values(&[BUS_NAME])
                .inc();
            warn!(bus = BUS_NAME, event_id = %envelope.id(), "Duplicate envelope rejected");
            return false;
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        bus_telemetry::EVENTS_EMITTED
            .with_label_values(&[BUS_NAME, &envelope.kind().to_string()])
            .inc();
        true
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of registered result observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Total envelopes emitted (both modes).
    pub fn events_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Envelopes rejected because their id was already emitted.
    pub fn duplicates_rejected(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Drop every handler registration and abort every worker.
    ///
    /// Pending `emit_and_wait` calls resolve with failed results; nothing
    /// is raised into any caller.
    pub fn shutdown(&self) {
        let handlers = self.registry.clear();
        let workers = self.workers.shutdown();
        info!(bus = BUS_NAME, handlers, workers, "Coordination bus shut down");
    }
}

impl Default for CoordinationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher<CoordinationEvent> for CoordinationBus {
    async fn publish(&self, envelope: CoordinationEnvelope) -> usize {
        self.emit(envelope)
    }

    fn events_published(&self) -> u64 {
        self.events_emitted()
    }
}

/// Handle returned by [`CoordinationBus::subscribe_results`].
#[derive(Debug)]
pub struct ObserverHandle {
    id: u64,
    observers: Weak<dyn Deregister>,
}

impl ObserverHandle {
    /// Stop observing results. Returns false if already removed.
    pub fn unsubscribe(self) -> bool {
        self.observers
            .upgrade()
            .map_or(false, |observers| observers.deregister(self.id))
    }
}

async fn run_worker(
    meta: Arc<SlotMeta>,
    handler: Arc<dyn CoordinationHandler>,
    mut receiver: mpsc::UnboundedReceiver<Dispatch>,
    observers: Arc<ObserverSet>,
) {
    while let Some(Dispatch { envelope, reply }) = receiver.recv().await {
        if !meta.is_active() {
            break;
        }

        let outcome = {
            let _timer = bus_telemetry::time_handler(BUS_NAME);
            AssertUnwindSafe(handler.handle(Arc::clone(&envelope)))
                .catch_unwind()
                .await
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(
                    bus = BUS_NAME,
                    handler = meta.name(),
                    event_id = %envelope.id(),
                    error = %err,
                    "Coordination handler failed"
                );
                HandlerResult::failed(meta.name(), err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    bus = BUS_NAME,
                    handler = meta.name(),
                    event_id = %envelope.id(),
                    panic = %message,
                    "Coordination handler panicked"
                );
                HandlerResult::failed(meta.name(), format!("handler panicked: {message}"))
            }
        };

        if result.is_failure() {
            bus_telemetry::HANDLER_FAILURES
                .with_label_values(&[BUS_NAME, meta.name()])
                .inc();
        }

        observers.notify(&envelope, &result);

        if let Some(reply) = reply {
            // The waiter may have been dropped; the result was still observed.
            let _ = reply.send(result);
        }
    }
    debug!(bus = BUS_NAME, handler = meta.name(), "Coordination worker stopped");
}
