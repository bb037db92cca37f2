//! Text embeddings.

mod types;

pub use types::{Embedding, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
