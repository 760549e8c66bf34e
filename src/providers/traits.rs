//! The provider capability trait.
//!
//! Every upstream vendor implements [`ProviderClient`] and nothing else;
//! resilience (retry, circuit breaking), caching and metrics are layered on
//! top by the gateway, so implementations stay plain HTTP clients.
//!
//! # Error semantics
//!
//! Implementations map upstream failures onto [`BifrostError`] categories,
//! which drive the retry engine's classification:
//! - transport failures and 429/5xx responses are transient and retryable
//! - 401 and 404 are permanent and returned as-is
//! - capabilities the vendor lacks return [`BifrostError::Unsupported`],
//!   which is permanent and never retried

use async_trait::async_trait;

use crate::types::{ChatOptions, ChatResponse, ChunkStream, EmbeddingResponse};
use crate::{BifrostError, Result};

/// A single upstream completion vendor.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name used in cache keys, metrics labels and logs.
    fn name(&self) -> &str;

    /// Non-streaming chat completion for a single user prompt.
    async fn chat(&self, prompt: &str, options: &ChatOptions) -> Result<ChatResponse>;

    /// Streaming chat completion; yields content deltas as they arrive.
    async fn stream(&self, prompt: &str, options: &ChatOptions) -> Result<ChunkStream>;

    /// Embed a single text.
    ///
    /// Default implementation reports the capability as unsupported, for
    /// vendors without an embeddings endpoint.
    async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
        Err(BifrostError::Unsupported {
            provider: self.name().to_owned(),
            operation: "embed".to_owned(),
        })
    }
}
