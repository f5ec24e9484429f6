//! # Layered Bus Test Suite
//!
//! Cross-crate tests for the properties every bus layer must hold.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Recording handlers and wait helpers
//! └── integration/
//!     ├── causal_ordering.rs
//!     ├── delivery.rs        # exactly-once, isolation, unsubscribe
//!     ├── replay.rs
//!     ├── fanout.rs          # backpressure, close semantics
//!     ├── coordination.rs    # emit_and_wait, observers, artifact links
//!     └── bridge.rs          # storage → coordination fidelity
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bus-tests
//! cargo test -p bus-tests integration::fanout::
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
