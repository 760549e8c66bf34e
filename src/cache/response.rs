//! Fingerprint-keyed response cache for upstream calls.
//!
//! [`ResponseCache`] stores completed chat and embedding responses under
//! their canonical [`fingerprint`](crate::fingerprint::fingerprint) key, so
//! an identical (provider, operation, input, options) request can be served
//! without touching the upstream. Streaming responses are intentionally
//! excluded — the gateway re-issues the upstream request for every stream.
//!
//! # Architecture
//!
//! The cache sits in the [`Gateway`](crate::gateway::Gateway), after the
//! rate limiter and in front of the retry engine. A cache hit still charges
//! the rate limit but bypasses retry logic and the upstream call; hit/miss
//! counters are emitted here and the per-bucket cache metrics are recorded
//! by the gateway.
//!
//! Storage is delegated to a [`KvStore`](crate::store::KvStore), so the
//! backing can be swapped without touching call sites. Cache keys live under
//! the `bifrost:` namespace; bulk eviction only ever touches that namespace
//! and leaves metric and rate-limit buckets alone.
//!
//! # Concurrency
//!
//! There is no stampede protection: two concurrent misses on the same
//! fingerprint both execute the upstream call and the last write wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::Result;
use crate::fingerprint::{self, fingerprint};
use crate::store::KvStore;
use crate::telemetry;
use crate::types::{ChatOptions, EmbedOptions};

/// Configuration for the response cache.
///
/// ```rust
/// # use bifrost::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new().ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is active. A disabled cache never reads or writes
    /// the store, but `remember` still executes the underlying work.
    /// Default: true.
    pub enabled: bool,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with caching switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Enable or disable caching.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Operational snapshot returned by [`ResponseCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub store: &'static str,
    pub namespace: String,
    pub store_diagnostics: Value,
}

/// Response cache over a pluggable [`KvStore`], keyed by canonical
/// fingerprints. See module docs for architecture notes.
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a cache over the given store.
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The default TTL applied to entries without a per-call override.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// The canonical store key for a request.
    pub fn key<T: Serialize>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &T,
    ) -> Result<String> {
        fingerprint(operation, provider, input, options)
    }

    /// Look up a cached response. Emits cache hit/miss counters; a disabled
    /// cache reads as a silent miss.
    pub async fn get<T: Serialize>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &T,
    ) -> Result<Option<Value>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let key = self.key(operation, provider, input, options)?;
        match self.store.get(&key).await? {
            Some(value) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL,
                    "provider" => provider.to_owned(),
                    "operation" => operation.to_owned(),
                )
                .increment(1);
                Ok(Some(value))
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL,
                    "provider" => provider.to_owned(),
                    "operation" => operation.to_owned(),
                )
                .increment(1);
                Ok(None)
            }
        }
    }

    /// Store a response, using the config TTL unless a per-call override is
    /// given. A disabled cache writes nothing.
    pub async fn put<T: Serialize>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &T,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let key = self.key(operation, provider, input, options)?;
        self.store
            .put(&key, value, ttl.unwrap_or(self.config.ttl))
            .await
    }

    /// Whether an unexpired entry exists for the request.
    pub async fn has<T: Serialize>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &T,
    ) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let key = self.key(operation, provider, input, options)?;
        self.store.has(&key).await
    }

    /// Drop the entry for the request. Returns whether one existed.
    pub async fn forget<T: Serialize>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &T,
    ) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let key = self.key(operation, provider, input, options)?;
        self.store.forget(&key).await
    }

    /// Time left before the entry for the request expires.
    pub async fn remaining_ttl<T: Serialize>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &T,
    ) -> Result<Option<Duration>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let key = self.key(operation, provider, input, options)?;
        self.store.remaining_ttl(&key).await
    }

    /// Serve from cache or execute `work` and store its result.
    ///
    /// Store failures degrade gracefully: a failed read is treated as a
    /// miss and a failed write is logged and dropped, so a completed
    /// upstream response always reaches the caller.
    pub async fn remember<T, F, Fut>(
        &self,
        operation: &str,
        provider: &str,
        input: &str,
        options: &T,
        work: F,
    ) -> Result<Value>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if !self.config.enabled {
            return work().await;
        }
        match self.get(operation, provider, input, options).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                warn!(operation, provider, error = %e, "cache read failed, treating as miss");
            }
        }
        let value = work().await?;
        if let Err(e) = self
            .put(operation, provider, input, options, value.clone(), None)
            .await
        {
            warn!(operation, provider, error = %e, "cache write failed, returning uncached response");
        }
        Ok(value)
    }

    /// Remove all entries whose key contains `pattern` (typically a
    /// provider or operation name).
    ///
    /// Best-effort: when the store cannot enumerate keys, the entire cache
    /// namespace is flushed instead. Returns how many entries were removed.
    pub async fn invalidate_matching(&self, pattern: &str) -> Result<u64> {
        let keys = match self.store.keys(&namespace()).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "key enumeration failed, flushing entire cache namespace");
                return self.invalidate_all().await;
            }
        };
        let mut removed = 0;
        for key in keys.iter().filter(|key| key.contains(pattern)) {
            if self.store.forget(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every cached response. Metric and rate-limit buckets share
    /// the store but live outside the `bifrost:` namespace and survive.
    pub async fn invalidate_all(&self) -> Result<u64> {
        self.store.flush_prefix(&namespace()).await
    }

    /// Operational snapshot: config, backing store name, and store
    /// diagnostics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.config.enabled,
            ttl_seconds: self.config.ttl.as_secs(),
            store: self.store.name(),
            namespace: namespace(),
            store_diagnostics: self.store.diagnostics().await,
        }
    }

    /// Precompute the cache keys for a set of prompts across providers and
    /// operations, using default options. Lets operators prime dashboards
    /// or seed entries out of band without re-deriving the key scheme.
    pub fn warm_keys(
        &self,
        prompts: &[&str],
        providers: &[&str],
        operations: &[&str],
    ) -> Result<Vec<String>> {
        let mut keys = Vec::with_capacity(prompts.len() * providers.len() * operations.len());
        for prompt in prompts {
            for provider in providers {
                for operation in operations {
                    let payload = if *operation == "embed" {
                        EmbedOptions::default().fingerprint_payload()
                    } else {
                        ChatOptions::default().fingerprint_payload()
                    };
                    keys.push(self.key(operation, provider, prompt, &payload)?);
                }
            }
        }
        Ok(keys)
    }
}

/// The store namespace holding cache entries. The trailing colon keeps
/// `bifrost_metrics:*` and `bifrost_ratelimit:*` keys out of bulk evictions.
fn namespace() -> String {
    format!("{}:", fingerprint::KEY_PREFIX)
}
