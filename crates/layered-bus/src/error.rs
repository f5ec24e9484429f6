//! # Bus Errors

use thiserror::Error;

/// Errors from bus-level operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was closed; no new subscriptions are accepted.
    #[error("Event bus closed")]
    Closed,
}

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscription, or the bus that owns it, was closed.
    #[error("Subscription closed")]
    Closed,
}
