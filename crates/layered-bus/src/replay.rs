//! # Bounded Replay Buffer
//!
//! Fixed-capacity FIFO history of emitted envelopes, so subscribers that
//! start late (an indexer restarting) can catch up.
//!
//! ## Rules
//!
//! - `append` never blocks the producer and never fails; once full, the
//!   oldest envelope is evicted.
//! - `replay` works on a snapshot taken at call time: envelopes appended
//!   while a replay is running are not part of that replay.
//! - Order is insertion order, which is emission order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bus_types::{Envelope, Event};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::DEFAULT_REPLAY_CAPACITY;

/// Ring buffer of shared envelopes.
#[derive(Debug)]
pub struct ReplayBuffer<P> {
    entries: Mutex<VecDeque<Arc<Envelope<P>>>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl<P> ReplayBuffer<P> {
    /// Create a buffer with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Create a buffer holding at most `capacity` envelopes (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Append an envelope, evicting the oldest one if the buffer is full.
    pub fn append(&self, envelope: Arc<Envelope<P>>) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
            bus_telemetry::REPLAY_EVICTIONS.inc();
        }
        entries.push_back(envelope);
    }

    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Envelope<P>>> {
        self.entries.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total envelopes evicted since creation.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl<P: Event> ReplayBuffer<P> {
    /// Snapshot of envelopes with `timestamp >= since` whose type matches `kind`.
    ///
    /// `None` for either filter means "all".
    #[must_use]
    pub fn matching(
        &self,
        since: Option<DateTime<Utc>>,
        kind: Option<P::Kind>,
    ) -> Vec<Arc<Envelope<P>>> {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|env| since.map_or(true, |t| env.timestamp() >= t))
            .filter(|env| kind.map_or(true, |k| env.kind() == k))
            .cloned()
            .collect()
    }

    /// Invoke `handler` for each matching envelope in chronological order.
    ///
    /// The lock is released before the first invocation, so the handler may
    /// emit onto the same bus.
    ///
    /// # Returns
    ///
    /// The number of envelopes delivered.
    pub fn replay<F>(&self, since: Option<DateTime<Utc>>, kind: Option<P::Kind>, mut handler: F) -> usize
    where
        F: FnMut(&Arc<Envelope<P>>),
    {
        let snapshot = self.matching(since, kind);
        for envelope in &snapshot {
            handler(envelope);
        }
        snapshot.len()
    }
}

impl<P> Default for ReplayBuffer<P> {
    fn default() -> Self {
        Self::new()
    }
}
