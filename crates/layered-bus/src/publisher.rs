//! # Event Publisher
//!
//! Defines the producing side shared by every bus layer.

use async_trait::async_trait;
use bus_types::Envelope;

/// Trait for publishing envelopes to a bus.
///
/// Producers (a storage engine, a domain service) depend on this trait
/// rather than on a concrete bus, so tests can hand them a fresh instance.
#[async_trait]
pub trait EventPublisher<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Publish an envelope.
    ///
    /// # Returns
    ///
    /// The number of subscribers the envelope was scheduled or enqueued for.
    /// Returns once dispatch is scheduled, never after handlers finish.
    async fn publish(&self, envelope: Envelope<P>) -> usize;

    /// Get the total number of envelopes published.
    fn events_published(&self) -> u64;
}
