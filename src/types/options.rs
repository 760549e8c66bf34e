//! Request options for chat and embedding calls

use std::time::Duration;

use serde_json::{Value, json};

use crate::retry::RetryPolicy;

/// Options for chat and streaming requests (provider-agnostic).
///
/// Request-shaping fields (`model`, `max_tokens`, `temperature`) feed the
/// cache fingerprint; `ttl` and `retry` only change local behavior and are
/// excluded from it.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Per-call override of the response cache TTL.
    pub ttl: Option<Duration>,
    /// Per-call override of the gateway retry policy.
    pub retry: Option<RetryPolicy>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// The request-shaping fields that participate in the cache fingerprint.
    pub fn fingerprint_payload(&self) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

/// Options for embedding requests.
///
/// The embedding model is fixed per provider, so only local behavior is
/// tunable here.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Per-call override of the response cache TTL.
    pub ttl: Option<Duration>,
    /// Per-call override of the gateway retry policy.
    pub retry: Option<RetryPolicy>,
}

impl EmbedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn fingerprint_payload(&self) -> Value {
        json!({})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_and_retry_do_not_shape_the_fingerprint() {
        let plain = ChatOptions::default().model("gpt-4o").temperature(0.7);
        let tuned = plain
            .clone()
            .ttl(Duration::from_secs(5))
            .retry(RetryPolicy::default());
        assert_eq!(plain.fingerprint_payload(), tuned.fingerprint_payload());
    }

    #[test]
    fn unset_fields_stay_null() {
        let payload = ChatOptions::default().max_tokens(64).fingerprint_payload();
        assert_eq!(payload["max_tokens"], json!(64));
        assert!(payload["model"].is_null());
        assert!(payload["temperature"].is_null());
    }
}
