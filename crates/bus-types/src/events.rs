//! # Event Vocabularies
//!
//! Representative event types for the two handler-based buses. Callers are
//! free to define richer vocabularies; these are the ones the storage
//! bridge translates between.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, Event};

// =========================================================================
// STORAGE BUS
// =========================================================================

/// Type tag for storage mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageEventType {
    /// A datum was written.
    Put,
    /// A datum was removed.
    Delete,
}

impl fmt::Display for StorageEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageEventType::Put => f.write_str("PUT"),
            StorageEventType::Delete => f.write_str("DELETE"),
        }
    }
}

/// A committed storage mutation.
///
/// Producers emit these only after the mutation is durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StorageEvent {
    /// A datum was written under `key`.
    Put {
        key: String,
        value: serde_json::Value,
    },
    /// The datum under `key` was removed.
    Delete { key: String },
}

impl StorageEvent {
    pub fn put(key: impl Into<String>, value: serde_json::Value) -> Self {
        StorageEvent::Put {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        StorageEvent::Delete { key: key.into() }
    }

    /// Identity of the datum this mutation touched.
    pub fn key(&self) -> &str {
        match self {
            StorageEvent::Put { key, .. } | StorageEvent::Delete { key } => key,
        }
    }
}

impl Event for StorageEvent {
    type Kind = StorageEventType;

    fn kind(&self) -> Self::Kind {
        match self {
            StorageEvent::Put { .. } => StorageEventType::Put,
            StorageEvent::Delete { .. } => StorageEventType::Delete,
        }
    }
}

/// Envelope carrying a storage mutation.
pub type StorageEnvelope = Envelope<StorageEvent>;

// =========================================================================
// COORDINATION BUS
// =========================================================================

/// Type tag for cross-domain coordination events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinationEventType {
    DataStored,
    DataDeleted,
    ArtifactCreated,
    Custom,
}

impl fmt::Display for CoordinationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinationEventType::DataStored => "DATA_STORED",
            CoordinationEventType::DataDeleted => "DATA_DELETED",
            CoordinationEventType::ArtifactCreated => "ARTIFACT_CREATED",
            CoordinationEventType::Custom => "CUSTOM",
        };
        f.write_str(name)
    }
}

/// Events exchanged between domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinationEvent {
    /// A datum became available in storage.
    DataStored { datum_id: String },

    /// A datum was removed from storage.
    DataDeleted { datum_id: String },

    /// A domain produced an artifact in response to `origin`.
    ArtifactCreated { artifact_id: String, origin: String },

    /// Domain-specific event outside the built-in vocabulary.
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl CoordinationEvent {
    /// The datum identity, for data lifecycle events.
    pub fn datum_id(&self) -> Option<&str> {
        match self {
            CoordinationEvent::DataStored { datum_id }
            | CoordinationEvent::DataDeleted { datum_id } => Some(datum_id),
            _ => None,
        }
    }
}

impl Event for CoordinationEvent {
    type Kind = CoordinationEventType;

    fn kind(&self) -> Self::Kind {
        match self {
            CoordinationEvent::DataStored { .. } => CoordinationEventType::DataStored,
            CoordinationEvent::DataDeleted { .. } => CoordinationEventType::DataDeleted,
            CoordinationEvent::ArtifactCreated { .. } => CoordinationEventType::ArtifactCreated,
            CoordinationEvent::Custom { .. } => CoordinationEventType::Custom,
        }
    }
}

/// Envelope carrying a coordination event.
pub type CoordinationEnvelope = Envelope<CoordinationEvent>;
