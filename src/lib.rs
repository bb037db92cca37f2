//! # chatfn
//!
//! Client for a chat-completion service with typed function calling.
//!
//! ## Overview
//!
//! Host functions are described explicitly (parameters, types, examples), turned
//! into JSON Schema, validated by the service and attached to every conversation
//! request. When the model answers with a function call, the conversation marshals
//! the JSON arguments into native values, runs the function and sends the result
//! back, round after round, until the model produces a final answer. Both buffered
//! and streamed answers are supported.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatfn::functions::{FunctionDescriptor, ParameterDescriptor, ToolFunction};
//! use chatfn::ChatClient;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> chatfn::Result<()> {
//!     let client = ChatClient::from_env()?;
//!     let cancel = CancellationToken::new();
//!
//!     let distance = FunctionDescriptor::new("get_trip_distance")
//!         .description("Road distance between two cities in kilometres")
//!         .param(ParameterDescriptor::new::<String>("start"))
//!         .param(ParameterDescriptor::new::<String>("end"));
//!     let tool = ToolFunction::new(distance, |start: String, end: String| {
//!         Ok::<_, chatfn::BoxError>(serde_json::json!({ "distance": start.len() * end.len() }))
//!     })?;
//!     client.register_function(tool, &cancel).await?;
//!
//!     let mut conversation = client.conversation();
//!     let answer = conversation.ask("How far from Moscow to Tver?", &cancel).await?;
//!     println!("{}", answer.content());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client, builder and conversation runtime |
//! | [`functions`] | Descriptors, schema generation, registry, marshalling, invocation |
//! | [`types`] | Wire types (messages, requests, responses, chunks) |
//! | [`transport`] | HTTP transport and event-stream decoding |
//! | [`auth`] | Credential providers |
//! | [`config`] | Client configuration (YAML and environment) |
//! | [`embeddings`] | Embedding request/response types |
//! | [`tokens`] | Token counting types |
//! | [`files`] | File storage types |

pub mod auth;
pub mod client;
pub mod config;
pub mod embeddings;
pub mod files;
pub mod functions;
pub mod tokens;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::{ChatClient, ChatClientBuilder, ChatSettings, Conversation, InvocationFailurePolicy};
pub use config::ClientConfig;
pub use functions::{FunctionDescriptor, FunctionRegistry, ParameterDescriptor, ToolFunction, ToolType};
pub use types::{ChatHistory, ChatMessage, Role};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{BoxError, Error, ErrorContext};
