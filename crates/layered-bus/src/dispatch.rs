//! # Dispatch Plumbing
//!
//! Shared machinery for the handler-based buses (storage, coordination).
//!
//! ## Model
//! ```text
//!    emit(envelope)
//!        │   snapshot of matching slots (taken under the read lock)
//!        ├────────────► [queue H1] ─► worker H1 ─► handler H1
//!        ├────────────► [queue H2] ─► worker H2 ─► handler H2
//!        └────────────► [queue HN] ─► worker HN ─► handler HN
//! ```
//!
//! - Each registration owns an unbounded FIFO queue and one worker task, so a
//!   handler sees envelopes in emission order and a parent is always handled
//!   before a child emitted after it.
//! - Workers live in a bus-owned [`JoinSet`]; shutdown aborts them all.
//! - Unsubscribing marks the slot inactive before it is removed, and workers
//!   check the flag before every invocation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Identity and liveness of one registration, shared with its worker.
#[derive(Debug)]
pub(crate) struct SlotMeta {
    id: u64,
    name: String,
    active: AtomicBool,
}

impl SlotMeta {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// One registration: its metadata and the sending half of its queue.
pub(crate) struct Slot<T> {
    meta: Arc<SlotMeta>,
    sender: mpsc::UnboundedSender<T>,
}

impl<T> Slot<T> {
    pub(crate) fn id(&self) -> u64 {
        self.meta.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.meta.name
    }

    /// Queue an item for the worker. Returns false if the worker is gone.
    pub(crate) fn enqueue(&self, item: T) -> bool {
        self.meta.is_active() && self.sender.send(item).is_ok()
    }
}

/// Removes a registration by id. Implemented by every registry so
/// [`SubscriptionHandle`] can stay non-generic.
pub(crate) trait Deregister: Send + Sync {
    fn deregister(&self, id: u64) -> bool;
}

struct RegistryInner<K, T> {
    by_kind: HashMap<K, Vec<Arc<Slot<T>>>>,
    all: Vec<Arc<Slot<T>>>,
}

/// Map of type → registrations, plus the "all types" registrations.
pub(crate) struct Registry<K, T> {
    inner: RwLock<RegistryInner<K, T>>,
    next_id: AtomicU64,
}

impl<K, T> Registry<K, T>
where
    K: Copy + Eq + Hash,
{
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_kind: HashMap::new(),
                all: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new slot and hand back the receiving half of its queue.
    ///
    /// `kind == None` registers for every type.
    pub(crate) fn register(
        &self,
        kind: Option<K>,
        name: String,
    ) -> (Arc<SlotMeta>, mpsc::UnboundedReceiver<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let meta = Arc::new(SlotMeta {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name,
            active: AtomicBool::new(true),
        });
        let slot = Arc::new(Slot {
            meta: Arc::clone(&meta),
            sender,
        });

        let mut inner = self.inner.write();
        match kind {
            Some(kind) => inner.by_kind.entry(kind).or_default().push(slot),
            None => inner.all.push(slot),
        }

        (meta, receiver)
    }

    /// Immutable snapshot of every slot matching `kind`, in registration order.
    pub(crate) fn snapshot(&self, kind: K) -> Vec<Arc<Slot<T>>> {
        let inner = self.inner.read();
        let mut slots: Vec<Arc<Slot<T>>> = inner
            .by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .chain(inner.all.iter())
            .cloned()
            .collect();
        drop(inner);

        slots.sort_by_key(|slot| slot.id());
        slots
    }

    pub(crate) fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.all.len() + inner.by_kind.values().map(Vec::len).sum::<usize>()
    }

    /// Remove and deactivate every registration.
    pub(crate) fn clear(&self) -> usize {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let removed: Vec<Arc<Slot<T>>> = inner
            .by_kind
            .drain()
            .flat_map(|(_, slots)| slots)
            .chain(inner.all.drain(..))
            .collect();
        drop(guard);

        for slot in &removed {
            slot.meta.deactivate();
        }
        removed.len()
    }
}

impl<K, T> Deregister for Registry<K, T>
where
    K: Copy + Eq + Hash + Send + Sync,
    T: Send,
{
    fn deregister(&self, id: u64) -> bool {
        let mut inner = self.inner.write();
        let mut removed = None;

        if let Some(pos) = inner.all.iter().position(|slot| slot.id() == id) {
            removed = Some(inner.all.remove(pos));
        } else {
            for slots in inner.by_kind.values_mut() {
                if let Some(pos) = slots.iter().position(|slot| slot.id() == id) {
                    removed = Some(slots.remove(pos));
                    break;
                }
            }
            inner.by_kind.retain(|_, slots| !slots.is_empty());
        }
        drop(inner);

        match removed {
            Some(slot) => {
                slot.meta.deactivate();
                debug!(handler = slot.name(), "Handler unsubscribed");
                true
            }
            None => false,
        }
    }
}

/// Handle returned by `subscribe`/`register`.
///
/// Dropping the handle does NOT unsubscribe; the registration lives until
/// [`SubscriptionHandle::unsubscribe`] is called or the bus shuts down.
pub struct SubscriptionHandle {
    id: u64,
    name: String,
    registry: Weak<dyn Deregister>,
}

impl SubscriptionHandle {
    pub(crate) fn new(meta: &SlotMeta, registry: Weak<dyn Deregister>) -> Self {
        Self {
            id: meta.id,
            name: meta.name.clone(),
            registry,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the registered handler.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the registration.
    ///
    /// Returns false if it was already gone (bus shut down or dropped).
    /// Once this returns, the handler is not invoked again.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.deregister(self.id))
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Owner of a bus's worker tasks.
pub(crate) struct WorkerPool {
    bus: &'static str,
    tasks: Mutex<JoinSet<()>>,
}

impl WorkerPool {
    pub(crate) fn new(bus: &'static str) -> Self {
        Self {
            bus,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Spawn a worker. Must be called from within a Tokio runtime.
    pub(crate) fn spawn<F>(&self, worker: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        Self::reap(self.bus, &mut tasks);
        tasks.spawn(worker);
    }

    /// Number of workers that have not been reaped yet.
    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Abort every worker. Queued work is abandoned, never propagated.
    pub(crate) fn shutdown(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        tasks.abort_all();
        Self::reap(self.bus, &mut tasks);
        count
    }

    fn reap(bus: &'static str, tasks: &mut JoinSet<()>) {
        while let Some(outcome) = tasks.try_join_next() {
            if let Err(err) = outcome {
                if err.is_panic() {
                    error!(bus, error = %err, "Bus worker panicked");
                }
            }
        }
    }
}

/// Render a panic payload for logs and failed results.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
