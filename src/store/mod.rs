//! Pluggable key-value storage behind the cache and metrics engines.
//!
//! Both the response cache and the metrics engine talk to a [`KvStore`]
//! rather than a concrete backend, so deployments can point them at any
//! store with get/put/increment/ttl semantics. Two in-process
//! implementations ship with the crate:
//!
//! - [`MemoryStore`] — plain map with an injectable clock, the default and
//!   the deterministic choice for tests,
//! - [`MokaStore`] — moka-backed with real-time per-entry expiry and
//!   bounded capacity, for long-running single-process deployments.
//!
//! Writes are atomic at the single-key level: `increment` and
//! `append_bounded` are single store operations, never read-modify-write
//! round trips through the caller. Cross-key consistency (e.g. a daily
//! bucket versus its hourly sibling) is eventual, not transactional.

mod memory;
mod moka;

pub use memory::MemoryStore;
pub use moka::MokaStore;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Key-value storage capability consumed by the cache and metrics engines.
///
/// All values are JSON; TTLs are mandatory and count from the write that
/// created the entry (`increment` and `append_bounded` keep the original
/// expiry on subsequent writes).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Identifier reported in cache stats (e.g. "memory", "moka").
    fn name(&self) -> &'static str;

    /// Fetch a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value with a fresh TTL, replacing any existing entry.
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Whether an unexpired entry exists.
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remove an entry. Returns whether one existed.
    async fn forget(&self, key: &str) -> Result<bool>;

    /// Atomically add one to a counter key, creating it at 1 with `ttl`
    /// when absent. The TTL is not refreshed on subsequent increments.
    /// Returns the new count.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Atomically append to a JSON array key, trimming to the most recent
    /// `cap` elements. Creates the array with `ttl` when absent; keeps the
    /// original expiry otherwise.
    async fn append_bounded(&self, key: &str, value: Value, cap: usize, ttl: Duration)
    -> Result<()>;

    /// Time left before the entry expires, `None` when absent.
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Enumerate unexpired keys starting with `prefix`.
    ///
    /// Stores that cannot enumerate return an error; callers needing
    /// bulk eviction fall back to [`flush_prefix`](Self::flush_prefix)
    /// over a broader namespace or drop everything.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every key starting with `prefix`. Returns how many were
    /// removed.
    async fn flush_prefix(&self, prefix: &str) -> Result<u64> {
        let keys = self.keys(prefix).await?;
        let mut removed = 0;
        for key in keys {
            if self.forget(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Store-specific diagnostics surfaced by cache stats. Additive,
    /// never required for correctness.
    async fn diagnostics(&self) -> Value {
        Value::Null
    }
}
