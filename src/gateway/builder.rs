//! Builder for assembling gateway instances.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{CacheConfig, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::error::{BifrostError, Result};
use crate::metrics::MetricsEngine;
use crate::providers::{
    AnthropicClient, GroqClient, OpenAiClient, ProviderClient, ProviderRegistry,
};
use crate::ratelimit::{RateLimitConfig, RateLimiter};
use crate::retry::{Retrier, RetryPolicy};
use crate::store::{KvStore, MemoryStore};

use super::Gateway;

/// Main entry point for creating gateway instances.
pub struct Bifrost;

impl Bifrost {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> BifrostBuilder {
        BifrostBuilder::new()
    }
}

/// Builder for configuring gateway instances.
///
/// Vendor helpers construct the built-in clients;
/// [`client`](BifrostBuilder::client) registers any [`ProviderClient`]
/// implementation alongside them. Subsystems not configured explicitly
/// fall back to library defaults: an in-memory store shared by the
/// cache, rate limiter, and metrics engine, the default cache and retry
/// configs, and no rate limits.
pub struct BifrostBuilder {
    openai_key: Option<String>,
    anthropic_key: Option<String>,
    groq_key: Option<String>,
    clients: Vec<Arc<dyn ProviderClient>>,
    store: Option<Arc<dyn KvStore>>,
    clock: Arc<dyn Clock>,
    cache_config: CacheConfig,
    retry_policy: RetryPolicy,
    rate_limits: HashMap<String, RateLimitConfig>,
    default_provider: Option<String>,
    metrics_providers: Option<Vec<String>>,
}

impl BifrostBuilder {
    pub fn new() -> Self {
        Self {
            openai_key: None,
            anthropic_key: None,
            groq_key: None,
            clients: Vec::new(),
            store: None,
            clock: Arc::new(SystemClock),
            cache_config: CacheConfig::new(),
            retry_policy: RetryPolicy::new(),
            rate_limits: HashMap::new(),
            default_provider: None,
            metrics_providers: None,
        }
    }

    /// Configure the OpenAI provider.
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.openai_key = Some(api_key.into());
        self
    }

    /// Configure the Anthropic provider.
    pub fn anthropic(mut self, api_key: impl Into<String>) -> Self {
        self.anthropic_key = Some(api_key.into());
        self
    }

    /// Configure the Groq provider (OpenAI-compatible API).
    pub fn groq(mut self, api_key: impl Into<String>) -> Self {
        self.groq_key = Some(api_key.into());
        self
    }

    /// Register a custom provider client under its own name.
    pub fn client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// Back the cache, rate limiter, and metrics with this store.
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the time source for every subsystem.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Response cache configuration.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Retry policy for calls without a per-call override.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Add a fixed-window rate limit for one provider.
    pub fn rate_limit(mut self, provider: impl Into<String>, config: RateLimitConfig) -> Self {
        self.rate_limits.insert(provider.into(), config);
        self
    }

    /// Provider used by the `*_default` call conveniences.
    ///
    /// Defaults to `openai` when configured, otherwise the first
    /// registered provider name in sorted order.
    pub fn default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Providers covered by unfiltered metrics queries and health
    /// evaluation. Defaults to every registered provider.
    pub fn metrics_providers(mut self, providers: Vec<String>) -> Self {
        self.metrics_providers = Some(providers);
        self
    }

    /// Build the gateway.
    ///
    /// Fails fast on configuration errors: no registered providers,
    /// a blank API key, or a default provider that is not registered.
    pub fn build(self) -> Result<Gateway> {
        let mut registry = ProviderRegistry::new();

        if let Some(key) = self.openai_key {
            let key = required_key("openai", key)?;
            registry.register(Arc::new(OpenAiClient::new(key)));
        }
        if let Some(key) = self.anthropic_key {
            let key = required_key("anthropic", key)?;
            registry.register(Arc::new(AnthropicClient::new(key)));
        }
        if let Some(key) = self.groq_key {
            let key = required_key("groq", key)?;
            registry.register(Arc::new(GroqClient::new(key)));
        }
        for client in self.clients {
            registry.register(client);
        }

        if registry.is_empty() {
            return Err(BifrostError::NoProvider);
        }

        let default_provider = match self.default_provider {
            Some(name) => {
                if !registry.contains(&name) {
                    return Err(BifrostError::UnknownProvider(name));
                }
                name
            }
            None if registry.contains("openai") => "openai".to_owned(),
            None => {
                let mut names = registry.names();
                names.remove(0)
            }
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::with_clock(self.clock.clone())));
        let metrics_providers = self.metrics_providers.unwrap_or_else(|| registry.names());

        let cache = ResponseCache::new(store.clone(), self.cache_config);
        let retrier = Retrier::with_clock(self.retry_policy, self.clock.clone());
        let mut limiter = RateLimiter::new(store.clone()).with_clock(self.clock.clone());
        for (provider, config) in self.rate_limits {
            limiter = limiter.limit(provider, config);
        }
        let monitor = MetricsEngine::new(store)
            .with_clock(self.clock)
            .with_providers(metrics_providers);

        Ok(Gateway::new(
            registry,
            cache,
            retrier,
            limiter,
            monitor,
            default_provider,
        ))
    }
}

impl Default for BifrostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn required_key(provider: &str, key: String) -> Result<String> {
    if key.trim().is_empty() {
        return Err(BifrostError::Configuration(format!(
            "empty API key for provider '{provider}'"
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use crate::metrics::Period;

    use super::*;

    #[test]
    fn build_without_providers_is_rejected() {
        let err = Bifrost::builder().build().unwrap_err();
        assert!(matches!(err, BifrostError::NoProvider));
    }

    #[test]
    fn blank_api_keys_fail_fast() {
        let err = Bifrost::builder().openai("  ").build().unwrap_err();
        assert!(matches!(err, BifrostError::Configuration(_)));
    }

    #[test]
    fn unknown_default_provider_is_rejected() {
        let err = Bifrost::builder()
            .openai("sk-test")
            .default_provider("gemini")
            .build()
            .unwrap_err();
        assert!(matches!(err, BifrostError::UnknownProvider(name) if name == "gemini"));
    }

    #[test]
    fn default_provider_prefers_openai() {
        let gateway = Bifrost::builder()
            .groq("gsk-test")
            .openai("sk-test")
            .build()
            .unwrap();
        assert_eq!(gateway.default_provider(), "openai");
        assert_eq!(gateway.providers(), vec!["groq", "openai"]);
    }

    #[test]
    fn default_provider_falls_back_to_first_registered() {
        let gateway = Bifrost::builder().groq("gsk-test").build().unwrap();
        assert_eq!(gateway.default_provider(), "groq");
    }

    #[tokio::test]
    async fn metrics_cover_every_registered_provider() {
        let gateway = Bifrost::builder()
            .openai("sk-test")
            .anthropic("sk-ant-test")
            .build()
            .unwrap();
        let report = gateway.metrics(None, None, Period::Day).await;
        let providers: Vec<&String> = report.providers.keys().collect();
        assert_eq!(providers, vec!["anthropic", "openai"]);
    }
}
