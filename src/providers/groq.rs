//! Groq client, speaking the OpenAI-compatible chat-completions protocol.
//!
//! Delegates the wire work to [`OpenAiClient`] configured with Groq's base
//! URL and defaults. Groq has no embeddings endpoint, so `embed` stays the
//! trait default and reports the capability as unsupported.

use async_trait::async_trait;

use crate::Result;
use crate::types::{ChatOptions, ChatResponse, ChunkStream};

use super::openai::OpenAiClient;
use super::traits::ProviderClient;

/// Default base URL for the Groq API (OpenAI-compatible surface)
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "mixtral-8x7b-32768";
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Client for the Groq API.
#[derive(Clone)]
pub struct GroqClient {
    inner: OpenAiClient,
}

impl GroqClient {
    /// Create a new Groq client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            inner: OpenAiClient::compatible(
                "groq",
                api_key,
                base_url,
                DEFAULT_MODEL,
                DEFAULT_TEMPERATURE,
            ),
        }
    }
}

#[async_trait]
impl ProviderClient for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    async fn chat(&self, prompt: &str, options: &ChatOptions) -> Result<ChatResponse> {
        self.inner.chat(prompt, options).await
    }

    async fn stream(&self, prompt: &str, options: &ChatOptions) -> Result<ChunkStream> {
        self.inner.stream(prompt, options).await
    }
}
