//! Buffered conversations with function calls.

use crate::mock_server::MockServerFixture;
use chatfn::functions::{FunctionDescriptor, ParameterDescriptor, ToolFunction};
use chatfn::{BoxError, Error, InvocationFailurePolicy, Role};
use mockito::Matcher;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct TripDistance {
    distance: u32,
}

fn trip_distance(calls: Arc<AtomicUsize>) -> ToolFunction {
    let descriptor = FunctionDescriptor::new("get_trip_distance")
        .description("Road distance between two places")
        .param(ParameterDescriptor::new::<String>("start").description("Departure"))
        .param(ParameterDescriptor::new::<String>("end").description("Destination"));
    ToolFunction::new(descriptor, move |start: String, end: String| {
        calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!((start.as_str(), end.as_str()), ("A", "B"));
        Ok::<_, BoxError>(TripDistance { distance: 42 })
    })
    .unwrap()
}

const CALL_REPLY: &str = r#"{
    "choices": [{
        "message": {
            "role": "assistant",
            "content": "",
            "function_call": {"name": "get_trip_distance", "arguments": {"start": "A", "end": "B"}},
            "functions_state_id": "state-1"
        },
        "index": 0,
        "finish_reason": "function_call"
    }],
    "created": 1700000000,
    "model": "GigaChat",
    "object": "chat.completion"
}"#;

const FINAL_REPLY: &str = r#"{
    "choices": [{
        "message": {"role": "assistant", "content": "It is 42 km from A to B."},
        "index": 0,
        "finish_reason": "stop"
    }],
    "created": 1700000001,
    "model": "GigaChat",
    "object": "chat.completion",
    "usage": {"prompt_tokens": 50, "completion_tokens": 10, "total_tokens": 60}
}"#;

/// First request: the prompt is the last turn.
fn first_request() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::Regex(r#""content":"How far from A to B\?"\}\]"#.to_string()),
        Matcher::Regex(r#""name":"get_trip_distance""#.to_string()),
        Matcher::Regex(r#""function_call":"auto""#.to_string()),
    ])
}

/// Follow-up request: carries the function result with the same state id.
fn follow_up_request() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::Regex(r#""role":"function""#.to_string()),
        Matcher::Regex(r#""functions_state_id":"state-1""#.to_string()),
        Matcher::Regex(r#"\{\\"distance\\":42\}"#.to_string()),
    ])
}

#[tokio::test]
async fn buffered_conversation_resolves_one_function_call() {
    let mut fixture = MockServerFixture::new().await;
    let validate = fixture.mock_validation_ok().await;
    let first = fixture
        .mock_json("/chat/completions", first_request(), CALL_REPLY)
        .await;
    let second = fixture
        .mock_json("/chat/completions", follow_up_request(), FINAL_REPLY)
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    client
        .register_function(trip_distance(calls.clone()), &cancel)
        .await
        .unwrap();

    let mut conversation = client.conversation();
    let response = conversation.ask("How far from A to B?", &cancel).await.unwrap();

    assert_eq!(response.content(), "It is 42 km from A to B.");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let turns = conversation.history().messages();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].role, Role::User);
    assert!(turns[1].is_function_call());
    assert_eq!(turns[1].functions_state_id.as_deref(), Some("state-1"));
    assert_eq!(turns[2].role, Role::Function);
    assert_eq!(turns[2].name.as_deref(), Some("get_trip_distance"));
    assert_eq!(turns[2].content, r#"{"distance":42}"#);
    assert_eq!(turns[2].functions_state_id.as_deref(), Some("state-1"));
    assert_eq!(turns[3].content, "It is 42 km from A to B.");

    validate.assert_async().await;
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn supplied_history_is_not_mutated_or_recorded() {
    let mut fixture = MockServerFixture::new().await;
    let _reply = fixture
        .mock_json(
            "/chat/completions",
            Matcher::Regex(r#""content":"earlier".*"content":"next""#.to_string()),
            FINAL_REPLY,
        )
        .await;

    let client = fixture.client();
    let conversation = client.conversation();
    let supplied = chatfn::ChatHistory::from(vec![
        chatfn::ChatMessage::user("earlier"),
        chatfn::ChatMessage::assistant("reply"),
    ]);

    let response = conversation
        .ask_with_history("next", &supplied, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.content(), "It is 42 km from A to B.");
    assert_eq!(supplied.len(), 2);
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn failing_function_propagates_and_keeps_history() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture.mock_validation_ok().await;
    let _first = fixture
        .mock_json("/chat/completions", first_request(), CALL_REPLY)
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();
    let descriptor = FunctionDescriptor::new("get_trip_distance")
        .description("Road distance between two places")
        .param(ParameterDescriptor::new::<String>("start"))
        .param(ParameterDescriptor::new::<String>("end"));
    let failing = ToolFunction::new(descriptor, |_: String, _: String| {
        Err::<TripDistance, _>("routing service unavailable")
    })
    .unwrap();
    client.register_function(failing, &cancel).await.unwrap();

    let mut conversation = client.conversation();
    let err = conversation
        .ask("How far from A to B?", &cancel)
        .await
        .unwrap_err();

    match err {
        Error::FunctionInvocation {
            function,
            arguments,
            ..
        } => {
            assert_eq!(function, "get_trip_distance");
            assert_eq!(arguments["start"], "A");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn failing_function_is_reported_to_the_model_when_asked() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture.mock_validation_ok().await;
    let _first = fixture
        .mock_json("/chat/completions", first_request(), CALL_REPLY)
        .await;
    let second = fixture
        .mock_json(
            "/chat/completions",
            Matcher::Regex(r#""role":"function".*routing service unavailable"#.to_string()),
            FINAL_REPLY,
        )
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();
    let descriptor = FunctionDescriptor::new("get_trip_distance")
        .description("Road distance between two places")
        .param(ParameterDescriptor::new::<String>("start"))
        .param(ParameterDescriptor::new::<String>("end"));
    let failing = ToolFunction::new(descriptor, |_: String, _: String| {
        Err::<TripDistance, _>("routing service unavailable")
    })
    .unwrap();
    client.register_function(failing, &cancel).await.unwrap();

    let mut conversation = client
        .conversation()
        .with_failure_policy(InvocationFailurePolicy::ReportToModel);
    conversation.ask("How far from A to B?", &cancel).await.unwrap();

    second.assert_async().await;
    let turns = conversation.history().messages();
    assert_eq!(turns.len(), 4);
    assert!(turns[2].content.contains("\"error\""));
}

#[tokio::test]
async fn unknown_finish_reason_is_a_protocol_error() {
    let mut fixture = MockServerFixture::new().await;
    let _reply = fixture
        .mock_json(
            "/chat/completions",
            Matcher::Any,
            r#"{"choices":[{"message":{"role":"assistant","content":"?"},"index":0,"finish_reason":"content_filter"}]}"#,
        )
        .await;

    let mut conversation = fixture.client().conversation();
    let err = conversation
        .ask("hi", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn cancelled_ask_leaves_history_untouched() {
    let fixture = MockServerFixture::new().await;
    let mut conversation = fixture.client().conversation();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = conversation.ask("hi", &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn system_prompt_starts_the_history() {
    let mut fixture = MockServerFixture::new().await;
    let _reply = fixture
        .mock_json(
            "/chat/completions",
            Matcher::Regex(r#"^\{"model":"GigaChat","messages":\[\{"role":"system","content":"Answer briefly"\}"#.to_string()),
            FINAL_REPLY,
        )
        .await;

    let mut conversation = fixture.client().conversation().with_system_prompt("Answer briefly");
    conversation.ask("hi", &CancellationToken::new()).await.unwrap();

    let turns = conversation.history().messages();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].role, Role::System);
}
