//! moka-backed store with per-entry expiry.

use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use serde_json::{Value, json};

use crate::Result;

use super::KvStore;

#[derive(Debug, Clone)]
struct Stored {
    value: Value,
    ttl: Duration,
    stored_at: SystemTime,
}

struct PerEntryTtl;

impl Expiry<String, Stored> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        stored: &Stored,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(stored.ttl)
    }
    // expire_after_update keeps the remaining duration, so counter and
    // ring-buffer writes do not refresh the TTL set at creation.
}

/// [`KvStore`] over `moka::future::Cache` with a bounded capacity.
///
/// Expiry rides moka's internal clock, not the injectable [`Clock`]
/// (crate::clock::Clock); when a test needs manual time control, use
/// [`MemoryStore`](super::MemoryStore) instead.
pub struct MokaStore {
    cache: Cache<String, Stored>,
}

impl MokaStore {
    /// Create a store holding up to 100,000 entries.
    pub fn new() -> Self {
        Self::with_max_capacity(100_000)
    }

    /// Create a store with an explicit entry cap.
    pub fn with_max_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.get(key).await.map(|stored| stored.value))
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        // Remove first so the insert runs the creation expiry policy and
        // the TTL restarts, matching put-replaces-entry semantics.
        self.cache.invalidate(key).await;
        self.cache
            .insert(
                key.to_owned(),
                Stored {
                    value,
                    ttl,
                    stored_at: SystemTime::now(),
                },
            )
            .await;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.cache.contains_key(key))
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64> {
        let entry = self
            .cache
            .entry(key.to_owned())
            .and_upsert_with(|existing| {
                let stored = match existing {
                    Some(entry) => {
                        let prev = entry.into_value();
                        Stored {
                            value: json!(prev.value.as_i64().unwrap_or(0) + 1),
                            ttl: prev.ttl,
                            stored_at: prev.stored_at,
                        }
                    }
                    None => Stored {
                        value: json!(1),
                        ttl,
                        stored_at: SystemTime::now(),
                    },
                };
                std::future::ready(stored)
            })
            .await;
        Ok(entry.value().value.as_i64().unwrap_or(0))
    }

    async fn append_bounded(
        &self,
        key: &str,
        value: Value,
        cap: usize,
        ttl: Duration,
    ) -> Result<()> {
        self.cache
            .entry(key.to_owned())
            .and_upsert_with(|existing| {
                let (mut samples, ttl, stored_at) = match existing {
                    Some(entry) => {
                        let prev = entry.into_value();
                        let samples = prev.value.as_array().cloned().unwrap_or_default();
                        (samples, prev.ttl, prev.stored_at)
                    }
                    None => (Vec::new(), ttl, SystemTime::now()),
                };
                samples.push(value);
                if samples.len() > cap {
                    let excess = samples.len() - cap;
                    samples.drain(..excess);
                }
                std::future::ready(Stored {
                    value: Value::Array(samples),
                    ttl,
                    stored_at,
                })
            })
            .await;
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.cache.get(key).await.and_then(|stored| {
            (stored.stored_at + stored.ttl)
                .duration_since(SystemTime::now())
                .ok()
        }))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }

    async fn diagnostics(&self) -> Value {
        self.cache.run_pending_tasks().await;
        json!({ "entries": self.cache.entry_count() })
    }
}
