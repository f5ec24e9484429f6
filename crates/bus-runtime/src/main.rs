//! # Layered Bus Demo Runtime
//!
//! Wires every bus layer together and drives a short scripted session:
//!
//! ```text
//! kv-store ──PUT/DELETE──► StorageBus ──► indexer
//!                              │
//!                              └──bridge──► CoordinationBus ──► summarizer
//!                                                 │
//!                                      results ───┼──► ArtifactLinks
//!                                                 └──► ResultRelay ──► FanOutBus ──► UI client
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load telemetry and runtime configuration from the environment
//! 2. Build the bus container (bridge wired unless `EB_WIRE_BRIDGE=false`)
//! 3. Attach handlers and observers
//! 4. Emit a few storage events and stream the resulting notices
//! 5. Print statistics and shut down

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bus_runtime::{ArtifactLinks, BusContainer, ResultNotice, ResultRelay, RuntimeConfig};
use bus_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use bus_types::{CoordinationEventType, Envelope, HandlerResult, StorageEvent};
use layered_bus::{coordination_handler, storage_handler};
use serde_json::json;
use tracing::{info, warn};

const NOTICE_WAIT: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = init_telemetry(TelemetryConfig::for_service("bus-runtime"))
        .context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env().context("Invalid runtime configuration")?;
    let container = BusContainer::new(config).context("Failed to build bus container")?;
    let storage = container.storage();
    let coordination = container.coordination();

    // Storage subscriber standing in for the semantic indexer.
    let _indexer = storage.subscribe_all(storage_handler("indexer", |env| async move {
        info!(key = env.payload().key(), kind = %env.kind(), "Indexed");
        Ok(())
    }));

    // Cross-domain handler producing an artifact per stored datum.
    let _summarizer = coordination.register(
        CoordinationEventType::DataStored,
        coordination_handler("summarizer", |env| async move {
            let datum = env.payload().datum_id().unwrap_or_default().to_string();
            Ok(HandlerResult::ok("summarizer", format!("summarized {datum}"))
                .with_artifact(format!("summary:{datum}")))
        }),
    );

    let links = Arc::new(ArtifactLinks::new());
    let observer: Arc<ArtifactLinks> = Arc::clone(&links);
    let _links = coordination.subscribe_results(observer);

    let notices = container.fanout::<ResultNotice>();
    let mut client = notices
        .subscribe()
        .context("Notice bus closed before startup")?;
    let _relay = coordination.subscribe_results(Arc::new(ResultRelay::new(notices.clone())));

    for (key, value) in [("doc-1", json!({"title": "a"})), ("doc-2", json!({"title": "b"}))] {
        storage.emit(Envelope::new("kv-store", StorageEvent::put(key, value)));
    }
    storage.emit(Envelope::new("kv-store", StorageEvent::delete("doc-1")));

    let mut streamed = 0usize;
    while let Ok(Some(notice)) = client.get(Some(NOTICE_WAIT)).await {
        streamed += 1;
        let notice = notice.payload();
        info!(
            event_id = %notice.event_id,
            kind = ?notice.event_kind,
            handler = %notice.result.handler_name,
            success = notice.result.success,
            "Notice streamed"
        );
        if let Some(origin) = notice
            .result
            .artifact_id
            .as_deref()
            .and_then(|artifact| links.origin_of(artifact))
        {
            info!(%origin, "Artifact linked to coordination event");
        }
    }

    info!(
        storage_emitted = storage.events_emitted(),
        storage_handled = storage.events_handled(),
        storage_failures = storage.handler_failures(),
        replay_buffered = storage.buffer().len(),
        coordination_emitted = coordination.events_emitted(),
        artifacts = links.len(),
        notices_streamed = streamed,
        "Session complete"
    );

    let stats = notices.stats();
    info!(
        published = stats.published,
        delivered = stats.delivered,
        overflow = stats.overflow,
        "Notice bus statistics"
    );

    if telemetry.metrics_enabled() {
        match encode_metrics() {
            Ok(text) => println!("{text}"),
            Err(err) => warn!(error = %err, "Failed to encode metrics"),
        }
    }

    client.close();
    notices.close();
    container.shutdown();
    Ok(())
}
