//! # Event Envelope
//!
//! The immutable record of "something happened" that every bus layer carries.
//!
//! ## Properties
//!
//! - **Identity**: `id` is a random v4 UUID assigned at construction.
//! - **Time**: `timestamp` is assigned at construction and never changes.
//! - **Causality**: `causal_parent` optionally names the envelope that caused this one.
//! - **Immutability**: fields are private; builder methods consume the envelope,
//!   so an envelope can only be shaped before it is handed to a bus.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A payload that carries a type tag used for subscription filtering.
///
/// Buses key their subscriber registries by `Kind`, so it must be cheap to
/// copy and hashable.
pub trait Event: Send + Sync + 'static {
    /// The type tag for this event vocabulary.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// The type tag of this particular event.
    fn kind(&self) -> Self::Kind;
}

/// Immutable event envelope, generic over its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    id: EventId,
    timestamp: DateTime<Utc>,
    source: String,
    causal_parent: Option<EventId>,
    metadata: BTreeMap<String, String>,
    payload: P,
}

impl<P> Envelope<P> {
    /// Create an envelope, assigning a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: P) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            source: source.into(),
            causal_parent: None,
            metadata: BTreeMap::new(),
            payload,
        }
    }

    /// Record the envelope that caused this one.
    #[must_use]
    pub fn with_parent(mut self, parent: EventId) -> Self {
        self.causal_parent = Some(parent);
        self
    }

    /// Record `parent` as the cause of this envelope.
    #[must_use]
    pub fn caused_by<Q>(self, parent: &Envelope<Q>) -> Self {
        self.with_parent(parent.id)
    }

    /// Attach a metadata entry. Later entries with the same key win.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The component that produced this envelope.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn causal_parent(&self) -> Option<EventId> {
        self.causal_parent
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Look up a single metadata value.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P: Event> Envelope<P> {
    /// The payload's type tag.
    pub fn kind(&self) -> P::Kind {
        self.payload.kind()
    }
}
