//! Chat client and the conversation runtime built on it.
//!
//! Keep the public surface small: [`ChatClient`] for plain endpoint calls and
//! function registration, [`Conversation`] for function-calling dialogues.

pub mod builder;
pub mod conversation;
pub mod core;
mod stream;

pub use builder::ChatClientBuilder;
pub use conversation::{ChatSettings, Conversation, InvocationFailurePolicy};
pub use core::ChatClient;
