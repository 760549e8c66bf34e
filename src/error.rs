//! Bifrost error types

use std::time::Duration;

/// Message substrings that mark an untyped upstream failure as transient.
///
/// Upstream errors are not always typed consistently; when a failure
/// arrives as a bare message, these markers decide retryability.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "connection refused",
    "connection reset",
    "temporary failure",
    "rate limit",
    "too many requests",
    "service unavailable",
    "gateway timeout",
];

/// Bifrost error types
#[derive(Debug, thiserror::Error)]
pub enum BifrostError {
    // Provider/network errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed for provider '{0}'")]
    AuthenticationFailed(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Untyped upstream failure; retryability decided by message heuristic.
    #[error("upstream error: {0}")]
    Upstream(String),

    // Streaming errors
    #[error("stream error: {0}")]
    Stream(String),

    #[error("empty response from model")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provider lacks this capability entirely (e.g. embeddings on
    /// Anthropic). Permanent, never retried.
    #[error("provider '{provider}' does not support {operation}")]
    Unsupported { provider: String, operation: String },

    // Resilience-layer errors
    /// Raised before any attempt when the breaker for this
    /// (operation, provider) pair is open. Distinct from upstream errors
    /// so callers can tell "we stopped trying" from "upstream failed".
    #[error("circuit breaker open for {operation} on {provider}")]
    CircuitOpen { operation: String, provider: String },

    /// Final transient failure after the retry budget is spent, carrying
    /// how many attempts were made.
    #[error("{operation} on {provider} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        provider: String,
        attempts: u32,
        #[source]
        source: Box<BifrostError>,
    },

    // Key-value store errors (cache/metrics backends)
    #[error("store error: {0}")]
    Store(String),
}

impl BifrostError {
    /// Whether this failure is worth retrying.
    ///
    /// Transient: transport-class failures, rate limiting, retryable HTTP
    /// statuses (429/500/502/503/504), empty responses, and untyped
    /// stream/upstream failures whose message matches [`TRANSIENT_MARKERS`].
    /// Everything else — auth, validation, configuration, unsupported
    /// operations, exhausted retries — is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited { .. } | Self::EmptyResponse => true,
            Self::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Stream(msg) | Self::Upstream(msg) => message_is_transient(msg),
            _ => false,
        }
    }

    /// Provider-supplied backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP-like status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

fn message_is_transient(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| msg.contains(marker))
}

/// Result type alias for Bifrost operations
pub type Result<T> = std::result::Result<T, BifrostError>;
