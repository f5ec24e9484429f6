//! # Bus Wiring
//!
//! Connections between bus layers. Today that is the storage → coordination
//! bridge; the fan-out bus stays uncoupled and is fed by observers in
//! [`crate::handlers`].

pub mod storage_bridge;

pub use storage_bridge::{translate, wire_storage_bridge, StorageBridge, BRIDGE_SOURCE, ORIGIN_SOURCE_KEY};
