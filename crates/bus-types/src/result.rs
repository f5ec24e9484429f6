//! # Handler Results
//!
//! Outcome of one coordination handler processing one envelope.

use serde::{Deserialize, Serialize};

/// Outcome of a coordination handler.
///
/// Always produced, including when the handler errored or panicked; in that
/// case `success` is false and `message` carries the failure text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResult {
    /// Name of the handler that produced this result.
    pub handler_name: String,
    pub success: bool,
    pub message: String,
    /// Artifact produced by the handler, for cross-domain linking.
    pub artifact_id: Option<String>,
}

impl HandlerResult {
    /// A successful result.
    pub fn ok(handler_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
            success: true,
            message: message.into(),
            artifact_id: None,
        }
    }

    /// A failed result.
    pub fn failed(handler_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
            success: false,
            message: message.into(),
            artifact_id: None,
        }
    }

    /// Reference an artifact produced while handling the event.
    #[must_use]
    pub fn with_artifact(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }
}
