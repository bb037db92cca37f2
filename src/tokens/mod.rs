//! Server-side token accounting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct TokensCountRequest {
    pub model: String,
    pub input: Vec<String>,
}

/// Token and character count for one input string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensCount {
    #[serde(default)]
    pub object: String,
    pub tokens: u32,
    pub characters: u32,
}

/// Sum of token counts over a batch.
pub fn total_tokens(counts: &[TokensCount]) -> u32 {
    counts.iter().map(|c| c.tokens).sum()
}
