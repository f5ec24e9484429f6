//! # Result Relay
//!
//! Forwards every coordination handler result onto a fan-out bus, where UI
//! streaming clients each hold a bounded subscription.

use bus_types::{CoordinationEnvelope, CoordinationEventType, Envelope, EventId, HandlerResult};
use layered_bus::{FanOutBus, ResultObserver};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Source recorded on relayed notices.
pub const RELAY_SOURCE: &str = "result-relay";

/// One handler completion, as streamed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultNotice {
    /// Coordination envelope the handler processed.
    pub event_id: EventId,
    pub event_kind: CoordinationEventType,
    pub result: HandlerResult,
}

/// [`ResultObserver`] that publishes a [`ResultNotice`] per completion.
#[derive(Debug, Clone)]
pub struct ResultRelay {
    notices: FanOutBus<ResultNotice>,
}

impl ResultRelay {
    pub fn new(notices: FanOutBus<ResultNotice>) -> Self {
        Self { notices }
    }

    /// The bus notices are published on.
    pub fn notices(&self) -> &FanOutBus<ResultNotice> {
        &self.notices
    }
}

impl ResultObserver for ResultRelay {
    fn on_result(&self, envelope: &CoordinationEnvelope, result: &HandlerResult) {
        let notice = ResultNotice {
            event_id: envelope.id(),
            event_kind: envelope.kind(),
            result: result.clone(),
        };
        let delivered = self
            .notices
            .publish(Envelope::new(RELAY_SOURCE, notice).caused_by(envelope));
        trace!(event_id = %envelope.id(), handler = %result.handler_name, delivered, "Result relayed");
    }
}
