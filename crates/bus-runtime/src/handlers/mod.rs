//! # Result Observers
//!
//! Cross-cutting observers attached to the coordination bus with
//! `subscribe_results`.

pub mod artifact_links;
pub mod result_relay;

pub use artifact_links::ArtifactLinks;
pub use result_relay::{ResultNotice, ResultRelay, RELAY_SOURCE};
