//! # Delivery Guarantees
//!
//! Each handler registered before `emit` receives every matching envelope
//! exactly once; failures stay inside the failing handler; an unsubscribed
//! handler is not invoked again.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use bus_types::{Envelope, StorageEvent, StorageEventType};
    use layered_bus::StorageBus;
    use serde_json::json;

    use crate::fixtures::{FailingStorageHandler, StorageRecorder};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_emitters_deliver_exactly_once() {
        let bus = Arc::new(StorageBus::new());
        let recorders: Vec<_> = (0..3)
            .map(|n| StorageRecorder::new(&format!("handler-{n}")))
            .collect();
        let _subs: Vec<_> = recorders
            .iter()
            .map(|recorder| bus.subscribe_all(recorder.clone()))
            .collect();

        let mut producers = Vec::new();
        for producer in 0..4 {
            let bus = Arc::clone(&bus);
            producers.push(tokio::spawn(async move {
                for n in 0..50 {
                    bus.emit(Envelope::new(
                        "kv-store",
                        StorageEvent::put(format!("p{producer}-{n}"), json!(n)),
                    ));
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        for recorder in &recorders {
            assert!(recorder.wait_for(200).await);
        }
        // Give any duplicate a chance to show up.
        tokio::time::sleep(Duration::from_millis(50)).await;

        for recorder in &recorders {
            let ids = recorder.ids();
            assert_eq!(ids.len(), 200);
            let unique: HashSet<_> = ids.iter().collect();
            assert_eq!(unique.len(), 200, "duplicate delivery");
        }
        assert_eq!(bus.events_emitted(), 200);
    }

    #[tokio::test]
    async fn test_type_filter_and_all_subscribers() {
        let bus = StorageBus::new();
        let puts = StorageRecorder::new("puts");
        let deletes = StorageRecorder::new("deletes");
        let everything = StorageRecorder::new("everything");
        let _a = bus.subscribe(StorageEventType::Put, puts.clone());
        let _b = bus.subscribe(StorageEventType::Delete, deletes.clone());
        let _c = bus.subscribe_all(everything.clone());

        assert_eq!(bus.emit(Envelope::new("kv", StorageEvent::put("k", json!(1)))), 2);
        assert_eq!(bus.emit(Envelope::new("kv", StorageEvent::delete("k"))), 2);

        assert!(everything.wait_for(2).await);
        assert!(puts.wait_for(1).await);
        assert!(deletes.wait_for(1).await);
        assert_eq!(puts.count(), 1);
        assert_eq!(deletes.count(), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let bus = StorageBus::new();
        let _bad = bus.subscribe_all(Arc::new(FailingStorageHandler));
        let good = StorageRecorder::new("good");
        let _good = bus.subscribe_all(good.clone());

        for n in 0..10 {
            bus.emit(Envelope::new("kv", StorageEvent::put(format!("k{n}"), json!(n))));
        }

        assert!(good.wait_for(10).await);
        let failures_seen = crate::fixtures::eventually(crate::fixtures::WAIT, || {
            bus.handler_failures() == 10
        })
        .await;
        assert!(failures_seen);
        assert_eq!(good.count(), 10);
    }

    #[tokio::test]
    async fn test_no_invocation_after_unsubscribe() {
        let bus = StorageBus::new();
        let recorder = StorageRecorder::new("leaving");
        let handle = bus.subscribe_all(recorder.clone());

        bus.emit(Envelope::new("kv", StorageEvent::put("before", json!(null))));
        assert!(recorder.wait_for(1).await);

        assert!(handle.unsubscribe());
        assert_eq!(bus.emit(Envelope::new("kv", StorageEvent::put("after", json!(null)))), 0);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(recorder.keys(), vec!["before"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_discards_queued_envelopes() {
        let bus = StorageBus::new();
        let recorder = StorageRecorder::slow("slow", Duration::from_millis(20));
        let handle = bus.subscribe_all(recorder.clone());

        for n in 0..10 {
            bus.emit(Envelope::new("kv", StorageEvent::put(format!("k{n}"), json!(n))));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.unsubscribe();
        let at_unsubscribe = recorder.count();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // At most the invocation already in flight completes.
        assert!(recorder.count() <= at_unsubscribe + 1);
        assert!(recorder.count() < 10);
    }

    #[tokio::test]
    async fn test_re_emitting_same_envelope_delivers_once() {
        let bus = StorageBus::new();
        let recorder = StorageRecorder::new("indexer");
        let _sub = bus.subscribe_all(recorder.clone());

        let envelope = Envelope::new("kv-store", StorageEvent::put("x", json!(1)));
        let id = envelope.id();
        assert_eq!(bus.emit(envelope.clone()), 1);
        assert_eq!(bus.emit(envelope), 0);
        bus.emit(Envelope::new("kv-store", StorageEvent::put("y", json!(2))));

        assert!(recorder.wait_for(2).await);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(recorder.keys(), vec!["x", "y"]);
        assert_eq!(recorder.ids().iter().filter(|seen| **seen == id).count(), 1);
        assert_eq!(bus.buffer().len(), 2);
        assert_eq!(bus.duplicates_rejected(), 1);
    }
}
