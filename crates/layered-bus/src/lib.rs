//! # Layered Bus - In-Process Event Buses
//!
//! Three independent buses that let components communicate without direct
//! coupling, sharing one envelope type.
//!
//! ## Layers
//!
//! ```text
//!  storage engine ──emit──► ┌──────────────┐ ──► indexer, other storage handlers
//!                           │ Storage Bus  │
//!                           │ + replay buf │ ──► (bridge, wired by the runtime)
//!                           └──────────────┘            │
//!                                                       ▼
//!  domain services ──emit / emit_and_wait──► ┌──────────────────┐ ──► named handlers
//!                                            │ Coordination Bus │ ──► result observers
//!                                            └──────────────────┘
//!
//!  any producer ──publish──► ┌──────────────┐ ──► bounded queue per subscriber
//!                            │ Fan-Out Bus  │     (UI streaming clients)
//!                            └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Non-blocking producers:** `emit`/`publish` only schedule or enqueue.
//! - **Per-subscriber FIFO:** a subscriber never observes a child envelope
//!   before its causal parent when both went through the same bus.
//! - **Failure isolation:** handler errors and panics are caught, logged and
//!   counted per handler.
//! - **Unique ids:** an envelope whose id the bus has recently accepted is
//!   rejected, so a cloned envelope is never delivered twice.
//! - **Explicit instances:** no global bus; construct one and pass it around.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod coordination;
pub mod dedup;
mod dispatch;
pub mod error;
pub mod fanout;
pub mod publisher;
pub mod replay;
pub mod storage;

// Re-export main types
pub use coordination::{
    coordination_handler, CoordinationBus, CoordinationHandler, FnCoordinationHandler,
    ObserverHandle, ResultObserver,
};
pub use dedup::RecentIds;
pub use dispatch::SubscriptionHandle;
pub use error::{BusError, SubscriptionError};
pub use fanout::{FanOutBus, FanOutStats, FanOutStream, FanOutSubscription, SubscriptionStats};
pub use publisher::EventPublisher;
pub use replay::ReplayBuffer;
pub use storage::{storage_handler, FnStorageHandler, StorageBus, StorageHandler};

/// Envelopes kept by a storage bus's replay buffer unless configured.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1000;

/// Envelope ids each bus remembers to reject repeated emission.
pub const DEFAULT_DEDUP_WINDOW: usize = 4096;

/// Per-subscriber queue capacity of a fan-out bus unless configured.
pub const DEFAULT_FANOUT_CAPACITY: usize = 1000;
