//! # Bus Container
//!
//! Explicit bus instances and their configuration, passed to components by
//! dependency injection.

pub mod buses;
pub mod config;

pub use buses::BusContainer;
pub use config::{BusConfig, ConfigError, RuntimeConfig};
