//! # Typed Fan-Out Bus
//!
//! Generic multi-subscriber broadcast with a bounded queue per subscriber.
//!
//! ```text
//!                      ┌──► [queue S1, cap M] ──► subscriber 1
//!   publish(env) ──────┼──► [queue S2, cap M] ──► subscriber 2
//!   (try_send, never   └──► [queue S3, full ] ✗ overflow += 1
//!    blocks)
//! ```
//!
//! - A full queue drops the envelope for that subscriber only and counts it
//!   as overflow; the publisher and other subscribers are unaffected.
//! - Per subscriber, envelopes arrive in publish order.
//! - Bus `close()` releases every queue, so a pending `get()` wakes up with
//!   [`SubscriptionError::Closed`](crate::SubscriptionError::Closed) once the
//!   queue is drained. New subscriptions are rejected with
//!   [`BusError::Closed`](crate::BusError::Closed).
//! - Subscription `close()` (or drop) removes just that subscriber.

mod bus;
mod subscription;

pub use bus::{FanOutBus, FanOutStats};
pub use subscription::{FanOutStream, FanOutSubscription, SubscriptionStats};
