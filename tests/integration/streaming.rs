//! Integration tests for streamed conversations

use crate::mock_server::MockServerFixture;
use chatfn::functions::{FunctionDescriptor, ParameterDescriptor, ToolFunction};
use chatfn::{BoxError, Error, Role};
use futures::StreamExt;
use mockito::Matcher;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn deltas_are_forwarded_and_history_is_consolidated() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_sse_stream(
            Matcher::Regex(r#""stream":true"#.to_string()),
            &[
                r#"{"choices":[{"delta":{"role":"assistant","content":"Hel"},"index":0}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"},"index":0,"finish_reason":"stop"}]}"#,
                "[DONE]",
            ],
        )
        .await;

    let mut conversation = fixture.client().conversation();
    let deltas: Vec<String> = conversation
        .ask_stream("Say hello", &CancellationToken::new())
        .map(|d| d.unwrap())
        .collect()
        .await;

    assert_eq!(deltas, ["Hel", "lo"]);
    let turns = conversation.history().messages();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "Say hello");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, "Hello");
    mock.assert_async().await;
}

#[tokio::test]
async fn function_call_fragments_trigger_another_round() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture.mock_validation_ok().await;
    let first = fixture
        .mock_sse_stream(
            Matcher::Regex(r#""content":"Weather in Oslo\?"\}\]"#.to_string()),
            &[
                r#"{"choices":[{"delta":{"role":"assistant","content":"","function_call":{"name":"get_weather","arguments":{"city":"Oslo"}},"functions_state_id":"st-9"},"index":0,"finish_reason":"function_call"}]}"#,
                "[DONE]",
            ],
        )
        .await;
    let second = fixture
        .mock_sse_stream(
            Matcher::AllOf(vec![
                Matcher::Regex(r#""role":"function""#.to_string()),
                Matcher::Regex(r#""functions_state_id":"st-9""#.to_string()),
            ]),
            &[
                r#"{"choices":[{"delta":{"content":"It is "},"index":0}]}"#,
                r#"{"choices":[{"delta":{"content":"sunny"},"index":0,"finish_reason":"stop"}]}"#,
                "[DONE]",
            ],
        )
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();
    let descriptor = FunctionDescriptor::new("get_weather")
        .description("Current weather")
        .param(ParameterDescriptor::new::<String>("city"));
    let tool = ToolFunction::new(descriptor, |city: String| {
        Ok::<_, BoxError>(serde_json::json!({"city": city, "sky": "sunny"}))
    })
    .unwrap();
    client.register_function(tool, &cancel).await.unwrap();

    let mut conversation = client.conversation();
    let deltas: Vec<String> = conversation
        .ask_stream("Weather in Oslo?", &cancel)
        .map(|d| d.unwrap())
        .collect()
        .await;

    assert_eq!(deltas, ["It is ", "sunny"]);
    let turns = conversation.history().messages();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[1].function_call.as_ref().unwrap().name, "get_weather");
    assert_eq!(turns[1].functions_state_id.as_deref(), Some("st-9"));
    assert_eq!(turns[2].role, Role::Function);
    assert_eq!(turns[2].content, r#"{"city":"Oslo","sky":"sunny"}"#);
    assert_eq!(turns[3].content, "It is sunny");

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn content_before_a_function_call_is_kept_on_the_call_turn() {
    let mut fixture = MockServerFixture::new().await;
    let _validate = fixture.mock_validation_ok().await;
    let first = fixture
        .mock_sse_stream(
            Matcher::Regex(r#""content":"Time in Oslo\?"\}\]"#.to_string()),
            &[
                r#"{"choices":[{"delta":{"role":"assistant","content":"Let me check"},"index":0}]}"#,
                r#"{"choices":[{"delta":{"content":"","function_call":{"name":"local_time","arguments":{"city":"Oslo"}},"functions_state_id":"st-3"},"index":0,"finish_reason":"function_call"}]}"#,
                "[DONE]",
            ],
        )
        .await;
    let second = fixture
        .mock_sse_stream(
            Matcher::AllOf(vec![
                Matcher::Regex(r#""content":"Let me check""#.to_string()),
                Matcher::Regex(r#""role":"function""#.to_string()),
            ]),
            &[
                r#"{"choices":[{"delta":{"content":"It is noon"},"index":0,"finish_reason":"stop"}]}"#,
                "[DONE]",
            ],
        )
        .await;

    let client = fixture.client();
    let cancel = CancellationToken::new();
    let descriptor = FunctionDescriptor::new("local_time")
        .description("Local time in a city")
        .param(ParameterDescriptor::new::<String>("city"));
    let tool = ToolFunction::new(descriptor, |_city: String| Ok::<_, BoxError>("12:00"))
        .unwrap();
    client.register_function(tool, &cancel).await.unwrap();

    let mut conversation = client.conversation();
    let deltas: Vec<String> = conversation
        .ask_stream("Time in Oslo?", &cancel)
        .map(|d| d.unwrap())
        .collect()
        .await;

    assert_eq!(deltas, ["Let me check", "It is noon"]);
    let turns = conversation.history().messages();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[1].content, "Let me check");
    assert_eq!(turns[1].function_call.as_ref().unwrap().name, "local_time");
    assert_eq!(turns[2].content, r#""12:00""#);
    assert_eq!(turns[3].content, "It is noon");

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn cancelled_stream_yields_error_and_keeps_history() {
    let fixture = MockServerFixture::new().await;
    let mut conversation = fixture.client().conversation();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let items: Vec<chatfn::Result<String>> = conversation.ask_stream("hi", &cancel).collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(Error::Cancelled)));
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn truncated_stream_is_a_protocol_error() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_sse_stream(
            Matcher::Any,
            &[r#"{"choices":[{"delta":{"content":"partial"},"index":0}]}"#],
        )
        .await;

    let mut conversation = fixture.client().conversation();
    let items: Vec<chatfn::Result<String>> = conversation
        .ask_stream("hi", &CancellationToken::new())
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "partial");
    assert!(matches!(items[1], Err(Error::Protocol { .. })));
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn dropping_the_stream_early_keeps_history() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_sse_stream(
            Matcher::Any,
            &[
                r#"{"choices":[{"delta":{"content":"one"},"index":0}]}"#,
                r#"{"choices":[{"delta":{"content":"two"},"index":0,"finish_reason":"stop"}]}"#,
                "[DONE]",
            ],
        )
        .await;

    let mut conversation = fixture.client().conversation();
    {
        let mut stream = conversation.ask_stream("count", &CancellationToken::new());
        assert_eq!(stream.next().await.unwrap().unwrap(), "one");
    }
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn raw_chunk_stream_decodes_chunks() {
    let mut fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_sse_stream(
            Matcher::Regex(r#""stream":true"#.to_string()),
            &[
                r#"{"choices":[{"delta":{"content":"a"},"index":0}],"model":"GigaChat"}"#,
                "[DONE]",
            ],
        )
        .await;

    let client = fixture.client();
    let request = chatfn::types::ChatRequest::new("GigaChat", vec![chatfn::ChatMessage::user("x")]);
    let chunks: Vec<_> = client
        .chat_stream(&request, &CancellationToken::new())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 1);
    let chunk = chunks[0].as_ref().unwrap();
    assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("a"));
}
