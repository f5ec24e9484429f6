//! Cross-crate integration tests, one module per property group.

mod bridge;
mod causal_ordering;
mod coordination;
mod delivery;
mod replay;
