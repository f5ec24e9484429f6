//! # Storage → Coordination Bridge
//!
//! Republishes committed storage mutations as coordination events.
//!
//! ```text
//! StorageBus                          CoordinationBus
//!   PUT    { key }  ──translate──►      DATA_STORED  { datum_id: key }
//!   DELETE { key }  ──translate──►      DATA_DELETED { datum_id: key }
//! ```
//!
//! The bridge is a single storage subscriber for every event type, so its
//! one worker republishes mutations in storage order: a PUT followed by a
//! DELETE of the same key reaches the coordination bus in that order. It
//! keeps no state beyond its subscription, and a failure inside it is
//! isolated like any other handler failure. Translated envelopes name the
//! storage envelope as their causal parent.

use std::sync::Arc;

use async_trait::async_trait;
use bus_types::{CoordinationEnvelope, CoordinationEvent, Envelope, StorageEnvelope, StorageEvent};
use layered_bus::{CoordinationBus, StorageBus, StorageHandler, SubscriptionHandle};
use tracing::{debug, info};

/// Source recorded on every translated envelope.
pub const BRIDGE_SOURCE: &str = "storage-bridge";

/// Metadata key carrying the source of the originating storage envelope.
pub const ORIGIN_SOURCE_KEY: &str = "origin_source";

/// Translate one storage envelope into its coordination counterpart.
pub fn translate(envelope: &StorageEnvelope) -> CoordinationEnvelope {
    let event = match envelope.payload() {
        StorageEvent::Put { key, .. } => CoordinationEvent::DataStored {
            datum_id: key.clone(),
        },
        StorageEvent::Delete { key } => CoordinationEvent::DataDeleted {
            datum_id: key.clone(),
        },
    };

    Envelope::new(BRIDGE_SOURCE, event)
        .caused_by(envelope)
        .with_metadata(ORIGIN_SOURCE_KEY, envelope.source())
}

struct BridgeHandler {
    coordination: Arc<CoordinationBus>,
}

#[async_trait]
impl StorageHandler for BridgeHandler {
    fn name(&self) -> &str {
        BRIDGE_SOURCE
    }

    async fn handle(&self, envelope: Arc<StorageEnvelope>) -> anyhow::Result<()> {
        let translated = translate(&envelope);
        let scheduled = self.coordination.emit(translated);
        debug!(
            storage_event = %envelope.id(),
            key = envelope.payload().key(),
            scheduled,
            "Storage event bridged"
        );
        Ok(())
    }
}

/// Live bridge subscription.
#[derive(Debug)]
pub struct StorageBridge {
    subscription: SubscriptionHandle,
}

impl StorageBridge {
    /// Remove the bridge's storage subscription.
    ///
    /// # Returns
    ///
    /// Whether the subscription was still registered.
    pub fn detach(self) -> bool {
        let removed = self.subscription.unsubscribe();
        info!(removed, "Storage bridge detached");
        removed
    }
}

/// Subscribe a bridge for every storage event type.
///
/// Must be called from within a Tokio runtime.
pub fn wire_storage_bridge(
    storage: &StorageBus,
    coordination: Arc<CoordinationBus>,
) -> StorageBridge {
    let handler: Arc<dyn StorageHandler> = Arc::new(BridgeHandler { coordination });
    let subscription = storage.subscribe_all(handler);

    info!("Storage bridge wired");
    StorageBridge { subscription }
}
