//! Council dispatch contract tests against the scripted transport

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use llm_council::llm::fakes::{RecordingDiagnostics, ScriptedTransport, Step};
use llm_council::llm::{ChatCompletion, FailureCause};
use llm_council::{
    BackendId, BackendInvoker, ChatMessage, Config, Council, CouncilDispatcher, InvocationResult,
    TransportError,
};

fn setup(transport: ScriptedTransport) -> (CouncilDispatcher, Arc<RecordingDiagnostics>) {
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let invoker = BackendInvoker::new(Arc::new(transport)).with_diagnostics(diagnostics.clone());
    (CouncilDispatcher::new(invoker), diagnostics)
}

fn ids(names: &[&str]) -> Vec<BackendId> {
    names.iter().map(|n| BackendId::new(*n)).collect()
}

fn conversation() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Answer briefly."),
        ChatMessage::user("Name a prime number."),
    ]
}

fn answer(text: &str) -> Step {
    Step::reply(ChatCompletion::with_content(Some(text)))
}

#[tokio::test]
async fn every_requested_backend_gets_an_entry() {
    let transport = ScriptedTransport::new()
        .script("a", [answer("2")])
        .script("b", [answer("3")])
        .script("c", [Step::fail(TransportError::Malformed("eof".to_string()))]);
    let (dispatcher, _) = setup(transport);
    let backends = ids(&["a", "b", "c", "unscripted"]);

    let results = dispatcher.dispatch_all(&backends, &conversation()).await;

    let keys: HashSet<_> = results.iter().map(|(id, _)| id.clone()).collect();
    let expected: HashSet<_> = backends.into_iter().collect();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn failures_are_isolated() {
    let transport = ScriptedTransport::new()
        .script("good", [answer("7")])
        .script(
            "broken",
            [Step::fail(TransportError::Provider {
                status: 503,
                body: "overloaded".to_string(),
            })],
        );
    let (dispatcher, diagnostics) = setup(transport);

    let results = dispatcher
        .dispatch_all(&ids(&["good", "broken"]), &conversation())
        .await;

    assert_eq!(
        results.get(&BackendId::new("good")),
        Some(&InvocationResult::Success {
            content: Some("7".to_string())
        })
    );
    assert_eq!(
        results.get(&BackendId::new("broken")),
        Some(&InvocationResult::Absent)
    );
    assert_eq!(diagnostics.failed_backends(), ids(&["broken"]));
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_isolated() {
    let transport = ScriptedTransport::new()
        .script("quick", [answer("11").after(Duration::from_secs(1))])
        .script("stalled", [Step::hang()]);
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let invoker = BackendInvoker::new(Arc::new(transport))
        .with_diagnostics(diagnostics.clone())
        .with_timeout(Duration::from_secs(10));
    let dispatcher = CouncilDispatcher::new(invoker);

    let started = tokio::time::Instant::now();
    let results = dispatcher
        .dispatch_all(&ids(&["quick", "stalled"]), &conversation())
        .await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11), "took {:?}", elapsed);
    assert_eq!(results.get(&BackendId::new("quick")).unwrap().content(), Some("11"));
    assert!(results.get(&BackendId::new("stalled")).unwrap().is_absent());

    let failures = diagnostics.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].backend, BackendId::new("stalled"));
    assert_eq!(failures[0].cause, FailureCause::Timeout(Duration::from_secs(10)));
}

#[tokio::test]
async fn both_response_shapes_yield_the_same_content() {
    let transport = ScriptedTransport::new()
        .script(
            "mapping",
            [Step::reply(json!({"choices": [{"message": {"content": "hello"}}]}))],
        )
        .script("attributes", [answer("hello")]);
    let (dispatcher, _) = setup(transport);

    let results = dispatcher
        .dispatch_all(&ids(&["mapping", "attributes"]), &conversation())
        .await;

    assert_eq!(results.get(&BackendId::new("mapping")).unwrap().content(), Some("hello"));
    assert_eq!(
        results.get(&BackendId::new("attributes")).unwrap().content(),
        Some("hello")
    );
}

#[tokio::test]
async fn empty_answer_is_distinct_from_failure() {
    let transport = ScriptedTransport::new()
        .script("silent", [Step::reply(json!({"choices": [{"finish_reason": "length"}]}))])
        .script("down", [Step::fail(TransportError::UnknownRoute("down".to_string()))]);
    let (dispatcher, diagnostics) = setup(transport);

    let results = dispatcher
        .dispatch_all(&ids(&["silent", "down"]), &conversation())
        .await;

    let silent = results.get(&BackendId::new("silent")).unwrap();
    let down = results.get(&BackendId::new("down")).unwrap();
    assert_eq!(silent, &InvocationResult::Success { content: None });
    assert_eq!(down, &InvocationResult::Absent);
    assert_ne!(silent, down);
    assert_eq!(diagnostics.failed_backends(), ids(&["down"]));
}

#[tokio::test]
async fn empty_council_returns_empty_result() {
    let transport = ScriptedTransport::new();
    let calls = transport.calls();
    let (dispatcher, diagnostics) = setup(transport);

    let results = dispatcher.dispatch_all(&[], &conversation()).await;

    assert!(results.is_empty());
    assert!(calls.lock().unwrap().is_empty());
    assert!(diagnostics.failures().is_empty());
}

#[tokio::test]
async fn duplicate_backend_collapses_to_one_entry() {
    let transport = ScriptedTransport::new().script("x", [answer("13")]);
    let (dispatcher, _) = setup(transport);

    let results = dispatcher
        .dispatch_all(&ids(&["x", "x"]), &conversation())
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results.get(&BackendId::new("x")).unwrap().content(), Some("13"));
}

#[tokio::test(start_paused = true)]
async fn latency_is_bounded_by_the_slowest_backend() {
    let transport = ScriptedTransport::new()
        .script("a", [answer("a").after(Duration::from_secs(1))])
        .script("b", [answer("b").after(Duration::from_secs(5))]);
    let (dispatcher, _) = setup(transport);

    let started = tokio::time::Instant::now();
    let results = dispatcher
        .dispatch_all(&ids(&["a", "b"]), &conversation())
        .await;
    let elapsed = started.elapsed();

    assert_eq!(results.responded().count(), 2);
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(6), "took {:?}", elapsed);
}

#[tokio::test]
async fn every_backend_sees_the_same_conversation() {
    let transport = ScriptedTransport::new()
        .script("a", [answer("a")])
        .script("b", [answer("b")]);
    let calls = transport.calls();
    let (dispatcher, _) = setup(transport);

    dispatcher
        .dispatch_all(&ids(&["a", "b"]), &conversation())
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    for call in calls.iter() {
        assert_eq!(call.messages, conversation());
        assert_eq!(call.timeout, Some(Duration::from_secs(120)));
    }
}

#[tokio::test]
async fn council_uses_configured_members_and_timeout() {
    let mut config = Config::default();
    config.apply_overrides(|key| match key {
        "COUNCIL_MODELS" => Some(r#"["alpha", "beta"]"#.to_string()),
        _ => None,
    });
    config.council.timeout_secs = 30;

    let transport = ScriptedTransport::new()
        .script(
            "alpha",
            [
                Step::fail(TransportError::UnsupportedParameter("timeout")),
                answer("retried without timeout"),
            ],
        )
        .script("beta", [answer("beta")]);
    let calls = transport.calls();
    let council = Council::new(&config, Arc::new(transport));

    let results = council.query(&conversation()).await;

    assert_eq!(
        serde_json::to_value(&results).unwrap(),
        json!({
            "alpha": {"content": "retried without timeout"},
            "beta": {"content": "beta"}
        })
    );

    let timeouts: Vec<_> = calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.backend == BackendId::new("alpha"))
        .map(|c| c.timeout)
        .collect();
    assert_eq!(timeouts, vec![Some(Duration::from_secs(30)), None]);
}
