//! Mock HTTP server setup for integration tests

use chatfn::{ChatClient, ChatClientBuilder, ClientConfig};
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Route library logs to the test writer; enable with `RUST_LOG=chatfn=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        init_tracing();
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Create a test client with the mock server as base URL
    pub fn client(&self) -> ChatClient {
        ChatClientBuilder::new()
            .config(ClientConfig::default())
            .access_token("test-token")
            .base_url_override(&self.base_url)
            .build()
            .expect("client builds")
    }

    /// Accept every schema sent to the validation endpoint.
    pub async fn mock_validation_ok(&mut self) -> Mock {
        self.server
            .mock("POST", "/functions/validate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":200,"message":"Function is valid","json_ai_rules_version":"1.0.5"}"#)
            .create_async()
            .await
    }

    /// JSON reply to a POST whose body matches `body`.
    pub async fn mock_json(&mut self, path: &str, body: Matcher, reply: &str) -> Mock {
        self.server
            .mock("POST", path)
            .match_header("authorization", "Bearer test-token")
            .match_body(body)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(reply)
            .expect(1)
            .create_async()
            .await
    }

    /// Event-stream reply to a chat request whose body matches `body`.
    pub async fn mock_sse_stream(&mut self, body: Matcher, chunks: &[&str]) -> Mock {
        let payload = chunks
            .iter()
            .map(|chunk| {
                if chunk.starts_with("data: ") {
                    format!("{}\n\n", chunk)
                } else {
                    format!("data: {}\n\n", chunk)
                }
            })
            .collect::<String>();

        self.server
            .mock("POST", "/chat/completions")
            .match_body(body)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(payload)
            .expect(1)
            .create_async()
            .await
    }

    pub async fn mock_get(&mut self, path: &str, reply: &str) -> Mock {
        self.server
            .mock("GET", path)
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(reply)
            .create_async()
            .await
    }
}
