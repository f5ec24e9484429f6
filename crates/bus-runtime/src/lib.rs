//! # Bus Runtime Library
//!
//! Composition root for the layered event bus. The `bus-runtime` binary is a
//! small demo built on these modules.
//!
//! ## Modules
//!
//! - `container/` - runtime configuration and the [`BusContainer`]
//! - `wiring/` - storage → coordination bridge
//! - `handlers/` - result observers (fan-out relay, artifact links)

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod container;
pub mod handlers;
pub mod wiring;

pub use container::{BusConfig, BusContainer, ConfigError, RuntimeConfig};
pub use handlers::{ArtifactLinks, ResultNotice, ResultRelay};
pub use wiring::{wire_storage_bridge, StorageBridge};
