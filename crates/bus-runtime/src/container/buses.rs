//! # Bus Container
//!
//! Owns the explicit bus instances for one process (or one test).
//!
//! ## Initialization Order
//!
//! ```text
//! 1. Validate configuration
//! 2. Storage bus (replay buffer sized from config)
//! 3. Coordination bus
//! 4. Storage → coordination bridge (if enabled)
//! ```
//!
//! Components receive the buses they need from the container; there is no
//! process-wide accessor. Tests call [`BusContainer::fresh`] for an isolated
//! instance instead of resetting shared state.

use std::sync::Arc;

use layered_bus::{CoordinationBus, FanOutBus, StorageBus};
use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::container::config::{ConfigError, RuntimeConfig};
use crate::wiring::{wire_storage_bridge, StorageBridge};

/// Central container holding the bus instances.
pub struct BusContainer {
    storage: Arc<StorageBus>,
    coordination: Arc<CoordinationBus>,
    bridge: Mutex<Option<StorageBridge>>,

    /// Runtime configuration (immutable after initialization).
    pub config: RuntimeConfig,
}

impl BusContainer {
    /// Build the buses described by `config`.
    ///
    /// Must be called from within a Tokio runtime when the bridge is enabled.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is unusable.
    #[instrument(name = "bus_container_init", skip(config))]
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Isolated container with the default configuration.
    ///
    /// Every call returns independent buses; nothing is shared between
    /// instances.
    pub fn fresh() -> Self {
        Self::build(RuntimeConfig::default())
    }

    fn build(config: RuntimeConfig) -> Self {
        let storage = Arc::new(StorageBus::with_capacity(config.bus.replay_capacity));
        let coordination = Arc::new(CoordinationBus::new());

        let bridge = config
            .wire_storage_bridge
            .then(|| wire_storage_bridge(&storage, Arc::clone(&coordination)));

        info!(
            replay_capacity = config.bus.replay_capacity,
            fanout_capacity = config.bus.fanout_capacity,
            bridge = bridge.is_some(),
            "Bus container initialized"
        );

        Self {
            storage,
            coordination,
            bridge: Mutex::new(bridge),
            config,
        }
    }

    pub fn storage(&self) -> Arc<StorageBus> {
        Arc::clone(&self.storage)
    }

    pub fn coordination(&self) -> Arc<CoordinationBus> {
        Arc::clone(&self.coordination)
    }

    /// New fan-out bus sized from the configuration.
    ///
    /// Fan-out buses are per-purpose (one for result notices, one per UI
    /// feed, ...), so the container hands out new ones instead of owning them.
    pub fn fanout<P>(&self) -> FanOutBus<P>
    where
        P: Send + Sync + 'static,
    {
        FanOutBus::with_capacity(self.config.bus.fanout_capacity)
    }

    pub fn bridge_wired(&self) -> bool {
        self.bridge.lock().is_some()
    }

    /// Detach the bridge if it is wired. Returns false if it was not.
    pub fn detach_bridge(&self) -> bool {
        match self.bridge.lock().take() {
            Some(bridge) => {
                bridge.detach();
                true
            }
            None => false,
        }
    }

    /// Shut down both handler buses, abandoning queued work.
    pub fn shutdown(&self) {
        self.detach_bridge();
        self.storage.shutdown();
        self.coordination.shutdown();
        info!("Bus container shut down");
    }
}

impl std::fmt::Debug for BusContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusContainer")
            .field("config", &self.config)
            .field("bridge_wired", &self.bridge_wired())
            .finish_non_exhaustive()
    }
}
