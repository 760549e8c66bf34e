//! Wiremock integration tests for the provider HTTP clients.
//!
//! These tests verify wire formats, header handling, and error mapping
//! against mocked upstream responses.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bifrost::providers::{AnthropicClient, GroqClient, OpenAiClient, ProviderClient};
use bifrost::{BifrostError, ChatOptions};

// ============================================================================
// OpenAI chat
// ============================================================================

#[tokio::test]
async fn openai_chat_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "ping"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "pong"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8},
            "model": "gpt-4o-2024-08-06",
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let response = client.chat("ping", &ChatOptions::new()).await.unwrap();

    assert_eq!(response.content, "pong");
    assert_eq!(response.model, "gpt-4o-2024-08-06");
    assert_eq!(response.usage.total_tokens, Some(8));
}

#[tokio::test]
async fn openai_chat_sends_option_overrides() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 64,
            "temperature": 0.2,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}],
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let options = ChatOptions::new()
        .model("gpt-4o-mini")
        .max_tokens(64)
        .temperature(0.2);
    let response = client.chat("ping", &options).await.unwrap();

    assert_eq!(response.content, "ok");
    // No model in the body, so the request model is echoed back
    assert_eq!(response.model, "gpt-4o-mini");
}

#[tokio::test]
async fn openai_chat_without_choices_is_an_empty_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let result = client.chat("ping", &ChatOptions::new()).await;

    assert!(matches!(result, Err(BifrostError::EmptyResponse)));
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn error_401_maps_to_authentication_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("bad-key", server.uri());
    let result = client.chat("ping", &ChatOptions::new()).await;

    match result {
        Err(BifrostError::AuthenticationFailed(provider)) => assert_eq!(provider, "openai"),
        other => panic!("expected AuthenticationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn error_404_maps_to_model_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let options = ChatOptions::new().model("gpt-nonexistent");
    let result = client.chat("ping", &options).await;

    match result {
        Err(BifrostError::ModelNotFound(model)) => assert_eq!(model, "gpt-nonexistent"),
        other => panic!("expected ModelNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn error_429_carries_the_retry_after_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let result = client.chat("ping", &ChatOptions::new()).await;

    match result {
        Err(BifrostError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(30)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn error_500_maps_to_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let result = client.chat("ping", &ChatOptions::new()).await;

    match result {
        Err(BifrostError::Api { status, message }) => {
            assert_eq!(status, 500);
            assert!(message.contains("openai"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

// ============================================================================
// OpenAI streaming
// ============================================================================

#[tokio::test]
async fn openai_stream_yields_content_deltas() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let stream = client.stream("ping", &ChatOptions::new()).await.unwrap();
    let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

    assert_eq!(chunks, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn openai_stream_surfaces_malformed_chunks_as_errors() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        "data: not json\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let stream = client.stream("ping", &ChatOptions::new()).await.unwrap();
    let items: Vec<_> = stream.collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().unwrap(), "ok");
    assert!(matches!(items[1], Err(BifrostError::Stream(_))));
}

#[tokio::test]
async fn openai_stream_checks_status_before_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let result = client.stream("ping", &ChatOptions::new()).await;

    assert!(matches!(result, Err(BifrostError::RateLimited { .. })));
}

// ============================================================================
// OpenAI embeddings
// ============================================================================

#[tokio::test]
async fn openai_embed_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "hello world",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2, 0.3]}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 2, "total_tokens": 2},
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url("test-key", server.uri());
    let response = client.embed("hello world").await.unwrap();

    assert_eq!(response.embedding.len(), 3);
    assert!((response.embedding[0] - 0.1).abs() < 0.001);
    assert_eq!(response.model, "text-embedding-3-small");
    assert_eq!(response.usage.total_tokens, Some(2));
}

// ============================================================================
// Anthropic
// ============================================================================

#[tokio::test]
async fn anthropic_chat_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "ping"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "pong"}],
            "usage": {"input_tokens": 10, "output_tokens": 32},
            "model": "claude-3-5-sonnet-20241022",
        })))
        .mount(&server)
        .await;

    let client = AnthropicClient::with_base_url("test-key", server.uri());
    let response = client.chat("ping", &ChatOptions::new()).await.unwrap();

    assert_eq!(response.content, "pong");
    assert_eq!(response.usage.prompt_tokens, Some(10));
    assert_eq!(response.usage.completion_tokens, Some(32));
    // Derived from both sides, the wire has no explicit total
    assert_eq!(response.usage.total_tokens, Some(42));
}

#[tokio::test]
async fn anthropic_stream_yields_text_deltas() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = AnthropicClient::with_base_url("test-key", server.uri());
    let stream = client.stream("ping", &ChatOptions::new()).await.unwrap();
    let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

    assert_eq!(chunks, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn anthropic_embed_is_unsupported() {
    let client = AnthropicClient::new("test-key");
    let err = client.embed("hello").await.unwrap_err();

    match err {
        BifrostError::Unsupported {
            provider,
            operation,
        } => {
            assert_eq!(provider, "anthropic");
            assert_eq!(operation, "embed");
        }
        other => panic!("expected Unsupported, got {other:?}"),
    }
}

// ============================================================================
// Groq
// ============================================================================

#[tokio::test]
async fn groq_speaks_the_openai_protocol_under_its_own_name() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer gsk-test"))
        .and(body_partial_json(json!({"model": "mixtral-8x7b-32768"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "fast pong"}}],
            "model": "mixtral-8x7b-32768",
        })))
        .mount(&server)
        .await;

    let client = GroqClient::with_base_url("gsk-test", server.uri());
    assert_eq!(client.name(), "groq");

    let response = client.chat("ping", &ChatOptions::new()).await.unwrap();
    assert_eq!(response.content, "fast pong");
}

#[tokio::test]
async fn groq_auth_errors_name_groq_not_openai() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = GroqClient::with_base_url("bad-key", server.uri());
    let result = client.chat("ping", &ChatOptions::new()).await;

    match result {
        Err(BifrostError::AuthenticationFailed(provider)) => assert_eq!(provider, "groq"),
        other => panic!("expected AuthenticationFailed, got {other:?}"),
    }
}
