//! # Runtime Configuration
//!
//! Bus sizing and wiring options, with environment overrides.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EB_REPLAY_CAPACITY` | `1000` | Storage bus replay buffer size |
//! | `EB_FANOUT_CAPACITY` | `1000` | Per-subscriber queue size of fan-out buses |
//! | `EB_WIRE_BRIDGE` | `true` | Republish storage events on the coordination bus |

use std::env;

use layered_bus::{DEFAULT_FANOUT_CAPACITY, DEFAULT_REPLAY_CAPACITY};
use thiserror::Error;

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bus sizing.
    pub bus: BusConfig,
    /// Wire the storage -> coordination bridge at startup.
    pub wire_storage_bridge: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            wire_storage_bridge: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `EB_*` environment variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bus: BusConfig {
                replay_capacity: read_var("EB_REPLAY_CAPACITY", defaults.bus.replay_capacity)?,
                fanout_capacity: read_var("EB_FANOUT_CAPACITY", defaults.bus.fanout_capacity)?,
            },
            wire_storage_bridge: read_var("EB_WIRE_BRIDGE", defaults.wire_storage_bridge)?,
        })
    }

    /// Reject configurations the buses cannot honor.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroCapacity`] if either capacity is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.replay_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("replay_capacity"));
        }
        if self.bus.fanout_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("fanout_capacity"));
        }
        Ok(())
    }
}

/// Bus sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Envelopes kept for replay by the storage bus.
    pub replay_capacity: usize,
    /// Queue capacity of every fan-out subscription.
    pub fanout_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds a value of the wrong shape.
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },

    /// A capacity was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

fn read_var<T: ConfigValue>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => T::parse(raw.trim()).ok_or(ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

trait ConfigValue: Sized {
    fn parse(raw: &str) -> Option<Self>;
}

impl ConfigValue for usize {
    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ConfigValue for bool {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }
}
