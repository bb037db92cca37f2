use crate::client::builder::ChatClientBuilder;
use crate::client::conversation::Conversation;
use crate::config::ClientConfig;
use crate::embeddings::{EmbeddingRequest, EmbeddingResponse};
use crate::files::{FileDeleted, FileInfo, FileList, FileUpload};
use crate::functions::{FunctionRegistry, RegisteredFunction, ToolFunction, ValidationResult};
use crate::tokens::{TokensCount, TokensCountRequest};
use crate::transport::{sse, HttpTransport, TransportError};
use crate::types::{ChatChunk, ChatRequest, ChatResponse, ModelList};
use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub(crate) const CHAT_PATH: &str = "chat/completions";

/// Client for the chat service. Cheap to clone; clones share the transport and
/// the function registry.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) registry: Arc<FunctionRegistry>,
}

impl ChatClient {
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }

    /// Client configured from `CHATFN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ChatClientBuilder::new().build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Start a conversation with an empty history.
    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.clone())
    }

    /// Validate and register `function`; it is attached to every conversation request
    /// from then on.
    pub async fn register_function(
        &self,
        function: ToolFunction,
        cancel: &CancellationToken,
    ) -> Result<Arc<RegisteredFunction>> {
        self.registry.register(function, cancel).await
    }

    pub async fn validate_function(
        &self,
        function: &ToolFunction,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult> {
        self.registry.validate(function, cancel).await
    }

    /// One buffered completion, without function orchestration.
    pub async fn chat(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<ChatResponse> {
        let start = Instant::now();
        let response: ChatResponse = self.transport.post_json(CHAT_PATH, request, cancel).await?;
        info!(
            model = request.model.as_str(),
            messages = request.messages.len(),
            functions = request.functions.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );
        Ok(response)
    }

    /// One streamed completion as raw chunks. Dropping the stream closes the connection.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, ChatChunk>> {
        let request = request.clone().streaming(true);
        let bytes = self.transport.post_stream(CHAT_PATH, &request, cancel).await?;
        Ok(decode_chunks(bytes))
    }

    pub async fn embeddings<S: AsRef<str>>(
        &self,
        texts: &[S],
        cancel: &CancellationToken,
    ) -> Result<EmbeddingResponse> {
        let request = EmbeddingRequest::new(
            self.config.embeddings_model.clone(),
            texts.iter().map(|t| t.as_ref().to_string()).collect(),
        );
        self.transport.post_json("embeddings", &request, cancel).await
    }

    /// Token counts per input string, for the configured chat model.
    pub async fn tokens_count<S: AsRef<str>>(
        &self,
        texts: &[S],
        cancel: &CancellationToken,
    ) -> Result<Vec<TokensCount>> {
        let request = TokensCountRequest {
            model: self.config.model.clone(),
            input: texts.iter().map(|t| t.as_ref().to_string()).collect(),
        };
        self.transport.post_json("tokens/count", &request, cancel).await
    }

    pub async fn models(&self, cancel: &CancellationToken) -> Result<ModelList> {
        self.transport.get_json("models", cancel).await
    }

    pub async fn files(&self, cancel: &CancellationToken) -> Result<FileList> {
        self.transport.get_json("files", cancel).await
    }

    pub async fn file(&self, id: &str, cancel: &CancellationToken) -> Result<FileInfo> {
        self.transport.get_json(&format!("files/{}", id), cancel).await
    }

    pub async fn upload_file(&self, upload: FileUpload, cancel: &CancellationToken) -> Result<FileInfo> {
        let part = reqwest::multipart::Part::bytes(upload.content)
            .file_name(upload.filename)
            .mime_str(&upload.mime_type)
            .map_err(TransportError::Http)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("purpose", upload.purpose);
        self.transport.post_multipart("files", form, cancel).await
    }

    pub async fn delete_file(&self, id: &str, cancel: &CancellationToken) -> Result<FileDeleted> {
        self.transport
            .post_json(&format!("files/{}/delete", id), &serde_json::json!({}), cancel)
            .await
    }

    pub async fn file_content(&self, id: &str, cancel: &CancellationToken) -> Result<Bytes> {
        self.transport
            .get_bytes(&format!("files/{}/content", id), cancel)
            .await
    }
}

/// Event-stream bytes to typed chunks.
pub(crate) fn decode_chunks(bytes: BoxStream<'static, Bytes>) -> BoxStream<'static, ChatChunk> {
    Box::pin(sse::decode(bytes).map(|frame| {
        let value = frame?;
        serde_json::from_value::<ChatChunk>(value).map_err(|e| {
            Error::protocol_with_context(
                format!("unexpected chunk shape: {}", e),
                ErrorContext::new().with_source("chat_stream"),
            )
        })
    }))
}
