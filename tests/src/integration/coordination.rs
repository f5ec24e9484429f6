//! # Coordination Results
//!
//! `emit_and_wait` isolates handler failures, observers see every
//! completion, and artifact ids link domains through result observers.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bus_runtime::{ArtifactLinks, BusContainer, ResultNotice, ResultRelay};
    use bus_types::{CoordinationEnvelope, CoordinationEvent, CoordinationEventType, Envelope, HandlerResult};
    use layered_bus::{coordination_handler, CoordinationBus};
    use parking_lot::Mutex;

    use crate::fixtures::{eventually, CoordinationRecorder, FailingHandler, WAIT};

    fn stored(datum: &str) -> CoordinationEnvelope {
        Envelope::new(
            "test",
            CoordinationEvent::DataStored {
                datum_id: datum.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_one_failing_one_succeeding_handler() {
        let bus = CoordinationBus::new();
        let _bad = bus.register(
            CoordinationEventType::DataStored,
            FailingHandler::new("linker", "graph store unavailable"),
        );
        let good = CoordinationRecorder::new("indexer");
        let _good = bus.register(CoordinationEventType::DataStored, good.clone());

        let results = bus.emit_and_wait(stored("x")).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].handler_name, "linker");
        assert!(!results[0].success);
        assert!(!results[0].message.is_empty());
        assert_eq!(results[0].message, "graph store unavailable");
        assert_eq!(results[1], HandlerResult::ok("indexer", "recorded"));
        assert_eq!(good.count(), 1);
    }

    #[tokio::test]
    async fn test_observer_sees_both_emission_modes() {
        let bus = CoordinationBus::new();
        let _h = bus.register(CoordinationEventType::DataStored, CoordinationRecorder::new("indexer"));
        let _f = bus.register(
            CoordinationEventType::DataStored,
            FailingHandler::new("linker", "nope"),
        );

        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let _obs = bus.subscribe_results(Arc::new(
            move |env: &CoordinationEnvelope, result: &HandlerResult| {
                sink.lock().push((env.id(), result.handler_name.clone(), result.success));
            },
        ));

        let waited = stored("a");
        let waited_id = waited.id();
        bus.emit_and_wait(waited).await;
        let fired = stored("b");
        let fired_id = fired.id();
        bus.emit(fired);

        assert!(eventually(WAIT, || observed.lock().len() == 4).await);
        let observed = observed.lock().clone();
        for id in [waited_id, fired_id] {
            let mut outcomes: Vec<_> = observed
                .iter()
                .filter(|(event, _, _)| *event == id)
                .map(|(_, name, success)| (name.clone(), *success))
                .collect();
            outcomes.sort();
            assert_eq!(
                outcomes,
                vec![("indexer".to_string(), true), ("linker".to_string(), false)]
            );
        }
    }

    #[tokio::test]
    async fn test_artifacts_link_domains_and_reach_ui_stream() {
        let container = BusContainer::fresh();
        let coordination = container.coordination();

        let _summarizer = coordination.register(
            CoordinationEventType::DataStored,
            coordination_handler("summarizer", |env| async move {
                let datum = env.payload().datum_id().unwrap_or_default().to_string();
                Ok(HandlerResult::ok("summarizer", "summarized").with_artifact(format!("summary:{datum}")))
            }),
        );

        let links = Arc::new(ArtifactLinks::new());
        let observer: Arc<ArtifactLinks> = Arc::clone(&links);
        let _links = coordination.subscribe_results(observer);

        let notices = container.fanout::<ResultNotice>();
        let mut ui = notices.subscribe().unwrap();
        let _relay = coordination.subscribe_results(Arc::new(ResultRelay::new(notices.clone())));

        let envelope = stored("x");
        let event_id = envelope.id();
        let results = coordination.emit_and_wait(envelope).await;
        assert_eq!(results[0].artifact_id.as_deref(), Some("summary:x"));

        assert_eq!(links.artifacts_for(event_id), vec!["summary:x"]);
        assert_eq!(links.origin_of("summary:x"), Some(event_id));

        let notice = ui
            .get(Some(Duration::from_secs(1)))
            .await
            .unwrap()
            .expect("no notice streamed");
        assert_eq!(notice.payload().event_id, event_id);
        assert_eq!(notice.payload().result.artifact_id.as_deref(), Some("summary:x"));
        assert_eq!(notice.causal_parent(), Some(event_id));

        container.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_never_raises_into_waiters() {
        let bus = Arc::new(CoordinationBus::new());
        let _stuck = bus.register(
            CoordinationEventType::DataStored,
            coordination_handler("stuck", |_env| async move {
                std::future::pending::<()>().await;
                Ok(HandlerResult::ok("stuck", "unreachable"))
            }),
        );

        let pending = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.emit_and_wait(stored("x")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.shutdown();

        let results = tokio::time::timeout(WAIT, pending)
            .await
            .expect("emit_and_wait hung after shutdown")
            .expect("emit_and_wait panicked");
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(bus.emit(stored("y")), 0);
    }
}
