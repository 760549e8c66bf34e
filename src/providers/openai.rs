//! OpenAI chat-completions and embeddings client.
//!
//! Also the wire implementation behind [`GroqClient`](super::GroqClient):
//! Groq exposes the same chat-completions protocol, so it delegates here
//! with its own vendor name, base URL and defaults. Embeddings stay
//! OpenAI-only.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::types::{ChatOptions, ChatResponse, ChunkStream, EmbeddingResponse, TokenUsage};
use crate::{BifrostError, Result};

use super::backpressure::{self, DEFAULT_STREAM_BUFFER};
use super::sse;
use super::traits::ProviderClient;

/// Default base URL for the OpenAI API
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Client for the OpenAI API (chat completions, embeddings).
#[derive(Clone)]
pub struct OpenAiClient {
    vendor: &'static str,
    api_key: String,
    http: Client,
    base_url: String,
    default_model: &'static str,
    default_temperature: f32,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::compatible(
            "openai",
            api_key,
            base_url,
            DEFAULT_MODEL,
            DEFAULT_TEMPERATURE,
        )
    }

    /// An OpenAI-compatible endpoint under a different vendor identity.
    pub(super) fn compatible(
        vendor: &'static str,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: &'static str,
        default_temperature: f32,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");

        Self {
            vendor,
            api_key: api_key.into(),
            http,
            base_url: base_url.into(),
            default_model,
            default_temperature,
        }
    }

    fn chat_request<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a ChatOptions,
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: options.model.as_deref().unwrap_or(self.default_model),
            messages: vec![MessageParam {
                role: "user",
                content: prompt,
            }],
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature.unwrap_or(self.default_temperature),
            stream: stream.then_some(true),
        }
    }

    /// Check response status and map it to the matching error category.
    fn handle_response_errors(&self, response: &reqwest::Response, model: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 => Err(BifrostError::AuthenticationFailed(self.vendor.to_owned())),
            404 => Err(BifrostError::ModelNotFound(model.to_owned())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(BifrostError::RateLimited { retry_after })
            }
            code => Err(BifrostError::Api {
                status: code,
                message: format!("{} API error: {}", self.vendor, status),
            }),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn name(&self) -> &str {
        self.vendor
    }

    #[instrument(
        name = "provider.chat",
        skip(self, prompt, options),
        fields(provider = self.vendor, model = options.model.as_deref().unwrap_or(self.default_model))
    )]
    async fn chat(&self, prompt: &str, options: &ChatOptions) -> Result<ChatResponse> {
        let request = self.chat_request(prompt, options, false);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BifrostError::Transport(e.to_string()))?;

        self.handle_response_errors(&response, request.model)?;

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BifrostError::Transport(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(BifrostError::EmptyResponse)?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: body.usage,
            model: body.model.unwrap_or_else(|| request.model.to_owned()),
        })
    }

    #[instrument(
        name = "provider.stream",
        skip(self, prompt, options),
        fields(provider = self.vendor, model = options.model.as_deref().unwrap_or(self.default_model))
    )]
    async fn stream(&self, prompt: &str, options: &ChatOptions) -> Result<ChunkStream> {
        let request = self.chat_request(prompt, options, true);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BifrostError::Transport(e.to_string()))?;

        self.handle_response_errors(&response, request.model)?;

        let deltas = sse::data_events(response).filter_map(|event| async move {
            match event {
                Ok(payload) => delta_content(&payload).transpose(),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(backpressure::bounded_stream(
            Box::pin(deltas),
            DEFAULT_STREAM_BUFFER,
        ))
    }

    #[instrument(name = "provider.embed", skip(self, text), fields(provider = self.vendor))]
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: EMBEDDING_MODEL,
                input: text,
            })
            .send()
            .await
            .map_err(|e| BifrostError::Transport(e.to_string()))?;

        self.handle_response_errors(&response, EMBEDDING_MODEL)?;

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| BifrostError::Transport(e.to_string()))?;

        let first = body
            .data
            .into_iter()
            .next()
            .ok_or(BifrostError::EmptyResponse)?;

        Ok(EmbeddingResponse {
            embedding: first.embedding,
            model: body.model.unwrap_or_else(|| EMBEDDING_MODEL.to_owned()),
            usage: body.usage,
        })
    }
}

/// Extract the content delta from one stream chunk payload.
///
/// Chunks without content (role prelude, finish marker) yield `None`.
fn delta_content(payload: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| BifrostError::Stream(format!("malformed stream chunk: {e}")))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|content| !content.is_empty()))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessageParam<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct MessageParam<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: TokenUsage,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_applies_vendor_defaults() {
        let client = OpenAiClient::new("test-key");
        let options = ChatOptions::default();
        let request = client.chat_request("hi", &options, false);

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.max_tokens, 1024);
        assert_eq!(request.temperature, 0.7);
        assert!(request.stream.is_none());
    }

    #[test]
    fn options_override_the_defaults() {
        let client = OpenAiClient::new("test-key");
        let options = ChatOptions::new()
            .model("gpt-4o-mini")
            .max_tokens(64)
            .temperature(0.2);
        let request = client.chat_request("hi", &options, true);

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, 64);
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.stream, Some(true));
    }

    #[test]
    fn delta_parsing_skips_non_content_chunks() {
        let role = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(delta_content(role).unwrap(), None);

        let content = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(delta_content(content).unwrap(), Some("Hello".to_owned()));

        assert!(delta_content("not json").is_err());
    }
}
