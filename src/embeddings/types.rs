//! Embedding request/response types.

use serde::{Deserialize, Serialize};

/// A single embedding vector with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub index: usize,
    #[serde(rename = "embedding")]
    pub vector: Vec<f32>,
    #[serde(default = "default_object_type")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<EmbeddingUsage>,
}

fn default_object_type() -> String {
    "embedding".to_string()
}

impl Embedding {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

impl EmbeddingRequest {
    pub fn new(model: impl Into<String>, input: Vec<String>) -> Self {
        Self {
            model: model.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(rename = "data")]
    pub embeddings: Vec<Embedding>,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_list_type")]
    pub object: String,
}

fn default_list_type() -> String {
    "list".to_string()
}

impl EmbeddingResponse {
    pub fn first(&self) -> Option<&Embedding> {
        self.embeddings.first()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Tokens consumed across all inputs.
    pub fn prompt_tokens(&self) -> u32 {
        self.embeddings
            .iter()
            .filter_map(|e| e.usage.as_ref())
            .map(|u| u.prompt_tokens)
            .sum()
    }
}
