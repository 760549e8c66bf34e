//! Anthropic messages API client.
//!
//! Anthropic has no embeddings endpoint, so `embed` stays the trait
//! default and reports the capability as unsupported.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::types::{ChatOptions, ChatResponse, ChunkStream, TokenUsage};
use crate::{BifrostError, Result};

use super::backpressure::{self, DEFAULT_STREAM_BUFFER};
use super::sse;
use super::traits::ProviderClient;

/// Default base URL for the Anthropic API
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 1.0;
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl AnthropicClient {
    /// Create a new Anthropic client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into(),
        }
    }

    fn message_request<'a>(
        &self,
        prompt: &'a str,
        options: &'a ChatOptions,
        stream: bool,
    ) -> MessageRequest<'a> {
        MessageRequest {
            model: options.model.as_deref().unwrap_or(DEFAULT_MODEL),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![MessageParam {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            stream: stream.then_some(true),
        }
    }

    async fn send_messages(&self, request: &MessageRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| BifrostError::Transport(e.to_string()))?;

        self.handle_response_errors(&response, request.model)?;
        Ok(response)
    }

    /// Check response status and map it to the matching error category.
    fn handle_response_errors(&self, response: &reqwest::Response, model: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 => Err(BifrostError::AuthenticationFailed("anthropic".to_owned())),
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
                message: format!("anthropic API error: {status}"),
            }),
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(
        name = "provider.chat",
        skip(self, prompt, options),
        fields(provider = "anthropic", model = options.model.as_deref().unwrap_or(DEFAULT_MODEL))
    )]
    async fn chat(&self, prompt: &str, options: &ChatOptions) -> Result<ChatResponse> {
        let request = self.message_request(prompt, options, false);
        let response = self.send_messages(&request).await?;

        let body: MessageResponse = response
            .json()
            .await
            .map_err(|e| BifrostError::Transport(e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or(BifrostError::EmptyResponse)?;

        Ok(ChatResponse {
            content: text,
            usage: usage_from_wire(body.usage),
            model: body.model.unwrap_or_else(|| request.model.to_owned()),
        })
    }

    #[instrument(
        name = "provider.stream",
        skip(self, prompt, options),
        fields(provider = "anthropic", model = options.model.as_deref().unwrap_or(DEFAULT_MODEL))
    )]
    async fn stream(&self, prompt: &str, options: &ChatOptions) -> Result<ChunkStream> {
        let request = self.message_request(prompt, options, true);
        let response = self.send_messages(&request).await?;

        let deltas = sse::data_events(response).filter_map(|event| async move {
            match event {
                Ok(payload) => delta_text(&payload).transpose(),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(backpressure::bounded_stream(
            Box::pin(deltas),
            DEFAULT_STREAM_BUFFER,
        ))
    }
}

/// Anthropic reports input/output tokens; the total is derived so token
/// accounting sees the same field regardless of vendor.
fn usage_from_wire(usage: WireUsage) -> TokenUsage {
    let total_tokens = match (usage.input_tokens, usage.output_tokens) {
        (None, None) => None,
        (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
    };
    TokenUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens,
    }
}

/// Extract the text delta from one stream event payload.
///
/// Only `content_block_delta` events with a `text_delta` carry text;
/// message lifecycle events and pings yield `None`.
fn delta_text(payload: &str) -> Result<Option<String>> {
    let event: StreamEvent = serde_json::from_str(payload)
        .map_err(|e| BifrostError::Stream(format!("malformed stream event: {e}")))?;

    if event.kind != "content_block_delta" {
        return Ok(None);
    }
    Ok(event
        .delta
        .filter(|delta| delta.kind == "text_delta")
        .and_then(|delta| delta.text)
        .filter(|text| !text.is_empty()))
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
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
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: WireUsage,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<EventDelta>,
}

#[derive(Deserialize)]
struct EventDelta {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}
