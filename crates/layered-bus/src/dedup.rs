//! # Recent Id Window
//!
//! Bounded memory of envelope ids already accepted by a bus, so the same
//! envelope (a clone, or one deserialized twice) is not delivered twice.
//!
//! The window holds the most recent `capacity` ids; the oldest id is
//! forgotten once the window is full.

use std::collections::{HashSet, VecDeque};

use bus_types::EventId;
use parking_lot::Mutex;

use crate::DEFAULT_DEDUP_WINDOW;

#[derive(Debug, Default)]
struct Window {
    order: VecDeque<EventId>,
    seen: HashSet<EventId>,
}

/// Sliding set of recently accepted envelope ids.
#[derive(Debug)]
pub struct RecentIds {
    window: Mutex<Window>,
    capacity: usize,
}

impl RecentIds {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_WINDOW)
    }

    /// Remember at most `capacity` ids (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            capacity: capacity.max(1),
        }
    }

    /// Record `id` and return `true`, or return `false` if it is already in
    /// the window.
    pub fn admit(&self, id: EventId) -> bool {
        let mut window = self.window.lock();
        if !window.seen.insert(id) {
            return false;
        }
        window.order.push_back(id);
        if window.order.len() > self.capacity {
            if let Some(oldest) = window.order.pop_front() {
                window.seen.remove(&oldest);
            }
        }
        true
    }

    #[must_use]
    pub fn contains(&self, id: &EventId) -> bool {
        self.window.lock().seen.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.window.lock().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentIds {
    fn default() -> Self {
        Self::new()
    }
}
