//! # Storage → Coordination Bridge
//!
//! A storage PUT for datum "x" yields exactly one DATA_STORED for "x" on the
//! coordination bus, and bridge trouble never reaches storage subscribers.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bus_runtime::wiring::BRIDGE_SOURCE;
    use bus_runtime::{BusConfig, BusContainer, RuntimeConfig};
    use bus_types::{CoordinationEvent, CoordinationEventType, Envelope, StorageEvent};
    use serde_json::json;

    use crate::fixtures::{CoordinationRecorder, FailingHandler, StorageRecorder};

    #[tokio::test]
    async fn test_put_yields_exactly_one_data_stored() {
        let container = BusContainer::fresh();
        let stored = CoordinationRecorder::new("stored");
        let deleted = CoordinationRecorder::new("deleted");
        let coordination = container.coordination();
        let _s = coordination.register(CoordinationEventType::DataStored, stored.clone());
        let _d = coordination.register(CoordinationEventType::DataDeleted, deleted.clone());

        let put = Envelope::new("kv-store", StorageEvent::put("x", json!({"body": "hello"})));
        let put_id = put.id();
        container.storage().emit(put);

        assert!(stored.wait_for(1).await);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let seen = stored.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].payload(),
            &CoordinationEvent::DataStored {
                datum_id: "x".into()
            }
        );
        assert_eq!(seen[0].causal_parent(), Some(put_id));
        assert_eq!(seen[0].source(), BRIDGE_SOURCE);
        assert_eq!(deleted.count(), 0);
        assert_eq!(coordination.events_emitted(), 1);

        container.shutdown();
    }

    #[tokio::test]
    async fn test_delete_yields_data_deleted() {
        let container = BusContainer::fresh();
        let deleted = CoordinationRecorder::new("deleted");
        let _d = container
            .coordination()
            .register(CoordinationEventType::DataDeleted, deleted.clone());

        container
            .storage()
            .emit(Envelope::new("kv-store", StorageEvent::delete("x")));

        assert!(deleted.wait_for(1).await);
        assert_eq!(deleted.seen()[0].payload().datum_id(), Some("x"));
    }

    #[tokio::test]
    async fn test_coordination_failure_does_not_affect_storage_delivery() {
        let container = BusContainer::fresh();
        let coordination = container.coordination();
        let _bad = coordination.register(
            CoordinationEventType::DataStored,
            FailingHandler::new("linker", "boom"),
        );
        let indexer = StorageRecorder::new("indexer");
        let storage = container.storage();
        let _idx = storage.subscribe_all(indexer.clone());

        for n in 0..5 {
            storage.emit(Envelope::new("kv-store", StorageEvent::put(format!("k{n}"), json!(n))));
        }

        assert!(indexer.wait_for(5).await);
        assert_eq!(storage.handler_failures(), 0);
    }

    #[tokio::test]
    async fn test_unwired_bridge_emits_nothing() {
        let container = BusContainer::new(RuntimeConfig {
            bus: BusConfig::default(),
            wire_storage_bridge: false,
        })
        .unwrap();
        let stored = CoordinationRecorder::new("stored");
        let _s = container
            .coordination()
            .register(CoordinationEventType::DataStored, stored.clone());

        container
            .storage()
            .emit(Envelope::new("kv-store", StorageEvent::put("x", json!(1))));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(stored.count(), 0);
        assert_eq!(container.coordination().events_emitted(), 0);
    }
}
