//! Response types shared across providers

use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A stream of text chunks from a streaming chat call.
///
/// Finite and not restartable; each call re-issues the upstream request.
/// Production is buffered through a bounded channel, so a slow consumer
/// applies backpressure instead of growing memory. Upstream failures
/// terminate the stream with a final `Err` item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Non-streaming chat response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub usage: TokenUsage,
    pub model: String,
}

/// Embedding response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Token usage statistics. Upstreams differ in which counts they report, so
/// every field is optional.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl TokenUsage {
    /// Total tokens for the call, summing prompt and completion counts when
    /// the upstream omits an explicit total.
    pub fn total(&self) -> u32 {
        self.total_tokens.unwrap_or_else(|| {
            self.prompt_tokens.unwrap_or(0) + self.completion_tokens.unwrap_or(0)
        })
    }
}
