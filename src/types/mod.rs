//! Wire types shared by the client and the conversation runtime.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChatMessage`] | One conversation turn (system, user, assistant, function) |
//! | [`ChatHistory`] | Append-only transcript |
//! | [`ChatRequest`] / [`ChatResponse`] | Buffered chat completion |
//! | [`ChatChunk`] | One streamed fragment |
//! | [`ModelInfo`] | Entry of the model catalogue |

pub mod chat;
pub mod message;

pub use chat::{
    ChatChunk, ChatRequest, ChatResponse, Choice, ChunkChoice, Delta, FinishReason,
    FunctionCallDelta, FunctionCallPolicy, Usage,
};
pub use message::{ChatHistory, ChatMessage, FunctionCall, Role};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub owned_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelInfo>,
    #[serde(default)]
    pub object: String,
}
