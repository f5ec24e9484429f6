//! # Bus Types Crate
//!
//! Types shared by every layer of the event-bus substrate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: the envelope and event vocabularies used by
//!   the storage, coordination and fan-out buses are defined here.
//! - **Immutable Envelopes**: once an [`Envelope`] is handed to a bus it cannot
//!   change; handlers receive shared references.
//! - **Tagged Payloads**: payloads implement [`Event`] so buses can filter by
//!   type without knowing the vocabulary.

pub mod envelope;
pub mod events;
pub mod result;

pub use envelope::{Envelope, Event, EventId};
pub use events::{
    CoordinationEnvelope, CoordinationEvent, CoordinationEventType, StorageEnvelope, StorageEvent,
    StorageEventType,
};
pub use result::HandlerResult;
