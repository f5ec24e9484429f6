//! # Replay
//!
//! A late subscriber catches up from the storage bus's bounded history.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bus_types::{Envelope, StorageEvent, StorageEventType};
    use chrono::Utc;
    use layered_bus::StorageBus;
    use serde_json::json;

    use crate::fixtures::StorageRecorder;

    fn emit_keys(bus: &StorageBus, prefix: &str, count: usize) {
        for n in 0..count {
            bus.emit(Envelope::new(
                "kv-store",
                StorageEvent::put(format!("{prefix}-{n}"), json!(n)),
            ));
        }
    }

    #[tokio::test]
    async fn test_replay_since_returns_only_later_group_in_order() {
        let bus = StorageBus::new();
        emit_keys(&bus, "early", 5);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let cutoff = Utc::now();
        tokio::time::sleep(Duration::from_millis(2)).await;
        emit_keys(&bus, "late", 7);

        let mut keys = Vec::new();
        let delivered = bus.replay(Some(cutoff), None, |env| {
            keys.push(env.payload().key().to_string());
        });

        assert_eq!(delivered, 7);
        let expected: Vec<String> = (0..7).map(|n| format!("late-{n}")).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_restarted_indexer_catches_up_then_goes_live() {
        let bus = StorageBus::new();
        emit_keys(&bus, "seen", 3);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let last_seen = Utc::now();
        tokio::time::sleep(Duration::from_millis(2)).await;
        emit_keys(&bus, "missed", 4);

        let indexer = StorageRecorder::new("indexer");
        let caught_up = bus.replay_to(&*indexer, Some(last_seen), None).await;
        assert_eq!(caught_up, 4);

        let _live = bus.subscribe_all(indexer.clone());
        emit_keys(&bus, "live", 2);
        assert!(indexer.wait_for(6).await);

        assert_eq!(
            indexer.keys(),
            vec!["missed-0", "missed-1", "missed-2", "missed-3", "live-0", "live-1"]
        );
    }

    #[tokio::test]
    async fn test_replay_respects_capacity_and_type_filter() {
        let bus = StorageBus::with_capacity(4);
        emit_keys(&bus, "old", 3);
        bus.emit(Envelope::new("kv-store", StorageEvent::delete("old-0")));
        emit_keys(&bus, "new", 2);

        assert_eq!(bus.buffer().len(), 4);
        assert_eq!(bus.buffer().evicted(), 2);

        let mut keys = Vec::new();
        bus.replay(None, Some(StorageEventType::Put), |env| {
            keys.push(env.payload().key().to_string());
        });
        assert_eq!(keys, vec!["old-2", "new-0", "new-1"]);
    }
}
