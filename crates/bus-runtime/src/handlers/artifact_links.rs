//! # Artifact Links
//!
//! Cross-domain linking: a handler that produces an artifact reports its id
//! in [`HandlerResult::artifact_id`], and this observer records which event
//! created which artifact. The coordination bus itself never knows what an
//! artifact is.

use std::collections::HashMap;

use bus_types::{CoordinationEnvelope, EventId, HandlerResult};
use layered_bus::ResultObserver;
use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Links {
    by_event: HashMap<EventId, Vec<String>>,
    origin: HashMap<String, EventId>,
}

/// Event ↔ artifact index fed by coordination results.
#[derive(Debug, Default)]
pub struct ArtifactLinks {
    links: RwLock<Links>,
}

impl ArtifactLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts created while handling `event_id`, in completion order.
    pub fn artifacts_for(&self, event_id: EventId) -> Vec<String> {
        self.links
            .read()
            .by_event
            .get(&event_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The event whose handling created `artifact_id`.
    pub fn origin_of(&self, artifact_id: &str) -> Option<EventId> {
        self.links.read().origin.get(artifact_id).copied()
    }

    /// Number of linked artifacts.
    pub fn len(&self) -> usize {
        self.links.read().origin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultObserver for ArtifactLinks {
    fn on_result(&self, envelope: &CoordinationEnvelope, result: &HandlerResult) {
        let Some(artifact_id) = result.artifact_id.as_ref() else {
            return;
        };
        if !result.success {
            return;
        }

        let mut links = self.links.write();
        links
            .by_event
            .entry(envelope.id())
            .or_default()
            .push(artifact_id.clone());
        links.origin.insert(artifact_id.clone(), envelope.id());
        drop(links);

        debug!(
            event_id = %envelope.id(),
            artifact_id = %artifact_id,
            handler = %result.handler_name,
            "Artifact linked"
        );
    }
}
