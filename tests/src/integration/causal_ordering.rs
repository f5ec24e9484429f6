//! # Causal Ordering
//!
//! A subscriber never observes a child envelope before its causal parent,
//! even when the handler is slow and parents and children are interleaved.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use bus_types::{CoordinationEvent, CoordinationEventType, Envelope, EventId, StorageEvent};
    use layered_bus::{CoordinationBus, StorageBus};
    use serde_json::json;

    use crate::fixtures::{CoordinationRecorder, StorageRecorder};

    fn assert_parents_first(order: &[(EventId, Option<EventId>)]) {
        let position: HashMap<EventId, usize> = order
            .iter()
            .enumerate()
            .map(|(index, (id, _))| (*id, index))
            .collect();

        for (index, (_, parent)) in order.iter().enumerate() {
            if let Some(parent) = parent {
                let parent_index = position.get(parent).expect("parent never delivered");
                assert!(*parent_index < index, "child observed before its parent");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_storage_subscriber_sees_parent_before_child() {
        let bus = StorageBus::new();
        let recorder = StorageRecorder::slow("indexer", Duration::from_micros(200));
        let _sub = bus.subscribe_all(recorder.clone());

        for n in 0..100 {
            let key = format!("doc-{n}");
            let parent = Envelope::new("kv-store", StorageEvent::put(&key, json!(n)));
            let child = Envelope::new("kv-store", StorageEvent::delete(&key)).caused_by(&parent);
            bus.emit(parent);
            bus.emit(child);
        }

        assert!(recorder.wait_for(200).await);
        let order: Vec<_> = recorder
            .seen()
            .iter()
            .map(|env| (env.id(), env.causal_parent()))
            .collect();
        assert_parents_first(&order);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_coordination_handler_sees_parent_before_child() {
        let bus = CoordinationBus::new();
        let recorder = CoordinationRecorder::new("audit");
        let _handle = bus.register(CoordinationEventType::Custom, recorder.clone());

        let mut previous = None;
        for step in 0..50 {
            let mut envelope = Envelope::new(
                "workflow",
                CoordinationEvent::Custom {
                    name: format!("step-{step}"),
                    data: json!({ "step": step }),
                },
            );
            if let Some(parent) = previous {
                envelope = envelope.with_parent(parent);
            }
            previous = Some(envelope.id());
            bus.emit(envelope);
        }

        assert!(recorder.wait_for(50).await);
        let order: Vec<_> = recorder
            .seen()
            .iter()
            .map(|env| (env.id(), env.causal_parent()))
            .collect();
        assert_parents_first(&order);
    }
}
