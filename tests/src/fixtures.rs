//! # Test Fixtures
//!
//! Recording handlers shared by the integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bus_types::{CoordinationEnvelope, EventId, HandlerResult, StorageEnvelope};
use layered_bus::{CoordinationHandler, StorageHandler};
use parking_lot::Mutex;

/// Default bound for "eventually" assertions.
pub const WAIT: Duration = Duration::from_secs(2);

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(within, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Storage handler that records every envelope it receives.
pub struct StorageRecorder {
    name: String,
    seen: Mutex<Vec<Arc<StorageEnvelope>>>,
    delay: Option<Duration>,
}

impl StorageRecorder {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// A recorder that sleeps before recording each envelope.
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn seen(&self) -> Vec<Arc<StorageEnvelope>> {
        self.seen.lock().clone()
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.seen.lock().iter().map(|env| env.id()).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .map(|env| env.payload().key().to_string())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub async fn wait_for(&self, count: usize) -> bool {
        eventually(WAIT, || self.count() >= count).await
    }
}

#[async_trait]
impl StorageHandler for StorageRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<StorageEnvelope>) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.seen.lock().push(envelope);
        Ok(())
    }
}

/// Coordination handler that records envelopes and reports success.
pub struct CoordinationRecorder {
    name: String,
    seen: Mutex<Vec<Arc<CoordinationEnvelope>>>,
}

impl CoordinationRecorder {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<Arc<CoordinationEnvelope>> {
        self.seen.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub async fn wait_for(&self, count: usize) -> bool {
        eventually(WAIT, || self.count() >= count).await
    }
}

#[async_trait]
impl CoordinationHandler for CoordinationRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<CoordinationEnvelope>) -> anyhow::Result<HandlerResult> {
        self.seen.lock().push(envelope);
        Ok(HandlerResult::ok(&self.name, "recorded"))
    }
}

/// Coordination handler that always fails with `message`.
pub struct FailingHandler {
    name: String,
    message: String,
}

impl FailingHandler {
    pub fn new(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl CoordinationHandler for FailingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _envelope: Arc<CoordinationEnvelope>) -> anyhow::Result<HandlerResult> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// Storage handler that always fails.
pub struct FailingStorageHandler;

#[async_trait]
impl StorageHandler for FailingStorageHandler {
    fn name(&self) -> &str {
        "failing-storage"
    }

    async fn handle(&self, _envelope: Arc<StorageEnvelope>) -> anyhow::Result<()> {
        anyhow::bail!("disk quota exceeded")
    }
}
