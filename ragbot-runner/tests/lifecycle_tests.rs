//! Event-sequence and lifecycle properties over scripted backends.

mod common;

use common::{ScriptedStore, config, drain, harness, hit};
use proptest::prelude::*;
use ragbot_core::{GenerationEvent, Query};
use ragbot_model::MockInference;
use ragbot_rag::NoContextPolicy;
use ragbot_runner::RequestState;
use ragbot_telemetry::{EventStorage, InMemoryLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Clone)]
enum Ending {
    Finish(Option<String>),
    Fail,
    Truncate,
}

fn ending() -> impl Strategy<Value = Ending> {
    prop_oneof![
        proptest::option::of("[a-z ]{0,12}").prop_map(Ending::Finish),
        Just(Ending::Fail),
        Just(Ending::Truncate),
    ]
}

fn model(deltas: Vec<String>, ending: &Ending) -> MockInference {
    let model = MockInference::new(deltas);
    match ending {
        Ending::Finish(Some(text)) => model.with_final_text(text.clone()),
        Ending::Finish(None) => model,
        Ending::Fail => model.fail_with("backend crashed"),
        Ending::Truncate => model.truncated(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn exactly_one_terminal_event_and_monotonic_text(
        deltas in prop::collection::vec("[a-z ]{0,6}", 0..6),
        ending in ending(),
        sizes in prop::collection::vec(1usize..400, 0..4),
        fail_policy in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        let hits = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| hit(&format!("c{i}"), &format!("d{i}"), *size, 0.9 - i as f32 * 0.1))
            .collect();
        let policy = if fail_policy { NoContextPolicy::Fail } else { NoContextPolicy::ProceedEmpty };
        let h = harness(ScriptedStore::new(hits), model(deltas, &ending), config(300, policy));

        let (events, stream) = runtime.block_on(drain(h.orchestrator.answer(Query::new("q"), None)));

        // One terminal event, and it is last.
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        prop_assert_eq!(terminals, 1);
        prop_assert!(events.last().is_some_and(GenerationEvent::is_terminal));

        // Deltas concatenate to the completed text.
        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::Delta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if let Some(GenerationEvent::Completed { text, .. }) = events.last() {
            prop_assert_eq!(text, &streamed);
            prop_assert_eq!(stream.state(), RequestState::Completed);
        } else {
            prop_assert_eq!(stream.state(), RequestState::Failed);
        }

        // Visited states are lifecycle edges, never revisited.
        let visited = stream.visited();
        prop_assert_eq!(visited[0], RequestState::Received);
        prop_assert!(visited.windows(2).all(|w| w[0].can_transition_to(w[1])));
        let mut unique = visited.clone();
        unique.dedup();
        prop_assert_eq!(unique.len(), visited.len());
        prop_assert!(stream.context().is_none_or(|c| c.total_size <= 300));
    }
}

#[tokio::test]
async fn failures_are_logged_with_the_request_id() {
    let storage = EventStorage::new();
    let subscriber = tracing_subscriber::registry().with(InMemoryLayer::new(storage.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness(
        ScriptedStore::new(vec![hit("big", "d1", 1000, 0.9)]),
        MockInference::new(["unused"]),
        config(700, NoContextPolicy::Fail),
    );
    let (events, _) =
        drain(h.orchestrator.answer(Query::new("q").with_request_id("req-log"), None)).await;
    assert_eq!(events.len(), 1);

    let logs = storage.for_request("req-log");
    let failure = logs.iter().find(|e| e.message == "request failed").unwrap();
    assert!(failure.is_level(Level::ERROR));
    assert_eq!(failure.field_str("kind"), Some("NoContextFit"));

    let states: Vec<_> = logs
        .iter()
        .filter(|e| e.message == "request state changed")
        .filter_map(|e| e.field_str("state"))
        .collect();
    assert_eq!(states, ["retrieving", "assembling", "failed"]);
    assert!(logs.iter().any(|e| e.message == "no retrieved chunk fits the context budget"));
}
