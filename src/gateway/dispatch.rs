//! Request dispatch through the resilience pipeline.
//!
//! [`Gateway`] owns one instance of every subsystem and wires the call
//! path: resolve the provider, charge the rate limit, consult the
//! response cache, run the upstream call under the retry engine, then
//! persist the response and the observation. Cache and metrics failures
//! are logged and swallowed so a completed upstream response always
//! reaches the caller; only provider, rate-limit, and resilience errors
//! propagate.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::cache::{CacheStats, ResponseCache};
use crate::error::Result;
use crate::metrics::{
    ExportFormat, HealthReport, MetricRecord, MetricsEngine, MetricsReport, PerformanceStats,
    Period,
};
use crate::providers::ProviderRegistry;
use crate::ratelimit::{RateLimitDecision, RateLimiter};
use crate::retry::{CircuitReport, Retrier, RetryPolicy};
use crate::telemetry;
use crate::types::{
    ChatOptions, ChatResponse, ChunkStream, EmbedOptions, EmbeddingResponse, TokenUsage,
};

/// Multi-provider completion gateway.
///
/// Built via [`Bifrost::builder`](crate::Bifrost::builder). Every method
/// takes `&self`, so one instance can be shared across tasks behind an
/// `Arc`.
pub struct Gateway {
    registry: ProviderRegistry,
    cache: ResponseCache,
    retrier: Retrier,
    limiter: RateLimiter,
    monitor: MetricsEngine,
    default_provider: String,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("providers", &self.registry.names())
            .field("default_provider", &self.default_provider)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub(crate) fn new(
        registry: ProviderRegistry,
        cache: ResponseCache,
        retrier: Retrier,
        limiter: RateLimiter,
        monitor: MetricsEngine,
        default_provider: String,
    ) -> Self {
        Self {
            registry,
            cache,
            retrier,
            limiter,
            monitor,
            default_provider,
        }
    }

    /// Send a chat request through the full pipeline.
    ///
    /// Cache hits return without touching the upstream and are recorded
    /// as successful cached requests. Misses run the provider call under
    /// the retry engine (honoring a per-call [`ChatOptions::retry`]
    /// override), then write the response back with the per-call TTL if
    /// one is set.
    #[instrument(name = "gateway.chat", skip(self, prompt, options))]
    pub async fn chat(
        &self,
        provider: &str,
        prompt: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse> {
        let client = self.registry.get(provider)?;
        self.limiter.acquire(provider).await?;

        let payload = options.fingerprint_payload();
        if let Some(response) = self
            .lookup::<ChatResponse>("chat", provider, prompt, &payload)
            .await
        {
            self.monitor
                .record(
                    provider,
                    "chat",
                    MetricRecord::new().success(true).cache_hit(true),
                )
                .await;
            note_request(provider, "chat", true);
            return Ok(response);
        }

        let policy = options.retry.as_ref().unwrap_or(self.retrier.policy());
        let started = Instant::now();
        let result = self
            .retrier
            .execute_with("chat", provider, policy, || client.chat(prompt, options))
            .await;
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                self.persist("chat", provider, prompt, &payload, &response, options.ttl)
                    .await;
                let mut record = MetricRecord::new()
                    .success(true)
                    .response_time_ms(millis(elapsed))
                    .token_usage(response.usage);
                if self.cache.is_enabled() {
                    record = record.cache_hit(false);
                }
                self.monitor.record(provider, "chat", record).await;
                note_request(provider, "chat", true);
                note_duration(provider, "chat", elapsed);
                note_tokens(provider, &response.usage);
                Ok(response)
            }
            Err(e) => {
                self.monitor
                    .record(
                        provider,
                        "chat",
                        MetricRecord::new()
                            .success(false)
                            .response_time_ms(millis(elapsed)),
                    )
                    .await;
                note_request(provider, "chat", false);
                note_duration(provider, "chat", elapsed);
                Err(e)
            }
        }
    }

    /// Open a streaming chat completion.
    ///
    /// Streams bypass the response cache. The retry engine covers only
    /// connection establishment, so the recorded latency is time to
    /// stream open, not its full duration. Chunk-level failures surface
    /// as an `Err` item in the returned stream.
    #[instrument(name = "gateway.stream", skip(self, prompt, options))]
    pub async fn stream(
        &self,
        provider: &str,
        prompt: &str,
        options: &ChatOptions,
    ) -> Result<ChunkStream> {
        let client = self.registry.get(provider)?;
        self.limiter.acquire(provider).await?;

        let policy = options.retry.as_ref().unwrap_or(self.retrier.policy());
        let started = Instant::now();
        let result = self
            .retrier
            .execute_with("stream", provider, policy, || client.stream(prompt, options))
            .await;
        let elapsed = started.elapsed();

        match result {
            Ok(stream) => {
                self.monitor
                    .record(
                        provider,
                        "stream",
                        MetricRecord::new()
                            .success(true)
                            .response_time_ms(millis(elapsed)),
                    )
                    .await;
                note_request(provider, "stream", true);
                note_duration(provider, "stream", elapsed);
                Ok(stream)
            }
            Err(e) => {
                self.monitor
                    .record(
                        provider,
                        "stream",
                        MetricRecord::new()
                            .success(false)
                            .response_time_ms(millis(elapsed)),
                    )
                    .await;
                note_request(provider, "stream", false);
                note_duration(provider, "stream", elapsed);
                Err(e)
            }
        }
    }

    /// Request an embedding vector.
    ///
    /// Mirrors [`chat`](Self::chat) under the `embed` operation:
    /// providers without embedding support fail with
    /// [`BifrostError::Unsupported`](crate::BifrostError::Unsupported)
    /// before any retry is attempted.
    #[instrument(name = "gateway.embed", skip(self, text, options))]
    pub async fn embed(
        &self,
        provider: &str,
        text: &str,
        options: &EmbedOptions,
    ) -> Result<EmbeddingResponse> {
        let client = self.registry.get(provider)?;
        self.limiter.acquire(provider).await?;

        let payload = options.fingerprint_payload();
        if let Some(response) = self
            .lookup::<EmbeddingResponse>("embed", provider, text, &payload)
            .await
        {
            self.monitor
                .record(
                    provider,
                    "embed",
                    MetricRecord::new().success(true).cache_hit(true),
                )
                .await;
            note_request(provider, "embed", true);
            return Ok(response);
        }

        let policy = options.retry.as_ref().unwrap_or(self.retrier.policy());
        let started = Instant::now();
        let result = self
            .retrier
            .execute_with("embed", provider, policy, || client.embed(text))
            .await;
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                self.persist("embed", provider, text, &payload, &response, options.ttl)
                    .await;
                let mut record = MetricRecord::new()
                    .success(true)
                    .response_time_ms(millis(elapsed))
                    .token_usage(response.usage);
                if self.cache.is_enabled() {
                    record = record.cache_hit(false);
                }
                self.monitor.record(provider, "embed", record).await;
                note_request(provider, "embed", true);
                note_duration(provider, "embed", elapsed);
                note_tokens(provider, &response.usage);
                Ok(response)
            }
            Err(e) => {
                self.monitor
                    .record(
                        provider,
                        "embed",
                        MetricRecord::new()
                            .success(false)
                            .response_time_ms(millis(elapsed)),
                    )
                    .await;
                note_request(provider, "embed", false);
                note_duration(provider, "embed", elapsed);
                Err(e)
            }
        }
    }

    /// [`chat`](Self::chat) against the configured default provider.
    pub async fn chat_default(&self, prompt: &str, options: &ChatOptions) -> Result<ChatResponse> {
        self.chat(&self.default_provider, prompt, options).await
    }

    /// [`stream`](Self::stream) against the configured default provider.
    pub async fn stream_default(&self, prompt: &str, options: &ChatOptions) -> Result<ChunkStream> {
        self.stream(&self.default_provider, prompt, options).await
    }

    /// [`embed`](Self::embed) against the configured default provider.
    pub async fn embed_default(
        &self,
        text: &str,
        options: &EmbedOptions,
    ) -> Result<EmbeddingResponse> {
        self.embed(&self.default_provider, text, options).await
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        self.registry.names()
    }

    /// The provider used by the `*_default` conveniences.
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Circuit breaker state for one (operation, provider) pair.
    pub fn circuit_status(&self, operation: &str, provider: &str) -> CircuitReport {
        self.retrier.circuit_status(operation, provider)
    }

    /// Close a circuit and clear its failure history.
    pub fn reset_circuit(&self, operation: &str, provider: &str) {
        self.retrier.reset_circuit(operation, provider)
    }

    /// Per-provider health evaluation over the trailing hour.
    pub async fn health(&self) -> HealthReport {
        self.monitor.health().await
    }

    /// Aggregated metrics for the trailing `period`, optionally filtered
    /// to one provider and/or operation.
    pub async fn metrics(
        &self,
        provider: Option<&str>,
        operation: Option<&str>,
        period: Period,
    ) -> MetricsReport {
        self.monitor.metrics(provider, operation, period).await
    }

    /// Cross-operation performance summary over the trailing day.
    pub async fn performance(&self, provider: Option<&str>) -> PerformanceStats {
        self.monitor.performance(provider).await
    }

    /// Render collected metrics in the given export format.
    pub async fn export_metrics(&self, format: ExportFormat) -> Result<String> {
        self.monitor.export(format).await
    }

    /// Live response-cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop cached responses whose keys contain `pattern`.
    pub async fn invalidate_cache(&self, pattern: &str) -> Result<u64> {
        self.cache.invalidate_matching(pattern).await
    }

    /// Drop every cached response.
    pub async fn invalidate_cache_all(&self) -> Result<u64> {
        self.cache.invalidate_all().await
    }

    /// Current rate-limit window for `provider`, if one is configured.
    pub async fn rate_limit_status(&self, provider: &str) -> Option<RateLimitDecision> {
        self.limiter.check(provider).await
    }

    /// Cache lookup that degrades to a miss on store or decode failures.
    async fn lookup<T: DeserializeOwned>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &Value,
    ) -> Option<T> {
        let value = match self.cache.get(operation, provider, input, options).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!(operation, provider, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(operation, provider, error = %e, "cached entry failed to decode, refetching");
                None
            }
        }
    }

    /// Cache write that logs and drops failures.
    async fn persist<T: Serialize>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &Value,
        response: &T,
        ttl: Option<Duration>,
    ) {
        let value = match serde_json::to_value(response) {
            Ok(value) => value,
            Err(e) => {
                warn!(operation, provider, error = %e, "response not serializable, skipping cache write");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .put(operation, provider, input, options, value, ttl)
            .await
        {
            warn!(operation, provider, error = %e, "cache write failed, returning uncached response");
        }
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

fn note_request(provider: &str, operation: &str, ok: bool) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "operation" => operation.to_owned(),
        "status" => if ok { "ok" } else { "error" },
    )
    .increment(1);
}

fn note_duration(provider: &str, operation: &str, elapsed: Duration) {
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
        "provider" => provider.to_owned(),
        "operation" => operation.to_owned(),
    )
    .record(elapsed.as_secs_f64());
}

fn note_tokens(provider: &str, usage: &TokenUsage) {
    if let Some(count) = usage.prompt_tokens {
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "direction" => "prompt",
        )
        .increment(u64::from(count));
    }
    if let Some(count) = usage.completion_tokens {
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "direction" => "completion",
        )
        .increment(u64::from(count));
    }
}
