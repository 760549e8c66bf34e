//! In-process map-backed store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::clock::{Clock, SystemClock};
use crate::{BifrostError, Result};

use super::KvStore;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: SystemTime,
}

/// Mutex-protected in-memory [`KvStore`].
///
/// Expiry is evaluated lazily against the injected [`Clock`] on every
/// read, which is what makes TTL behaviour fully deterministic under a
/// [`ManualClock`](crate::clock::ManualClock) in tests. Entries are also
/// swept opportunistically during key enumeration so an idle store does
/// not accumulate dead weight.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store on a caller-supplied clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| BifrostError::Store("memory store lock poisoned".into()))
    }

    fn live_value(entry: &Entry, now: SystemTime) -> Option<&Value> {
        (entry.expires_at > now).then_some(&entry.value)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let expires_at = self.clock.now() + ttl;
        self.lock()?
            .insert(key.to_owned(), Entry { value, expires_at });
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .and_then(|e| Self::live_value(e, now))
            .is_some())
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let next = match entries.get(key).and_then(|e| Self::live_value(e, now)) {
            Some(value) => value.as_i64().unwrap_or(0) + 1,
            None => 1,
        };
        if next == 1 {
            entries.insert(
                key.to_owned(),
                Entry {
                    value: json!(next),
                    expires_at: now + ttl,
                },
            );
        } else if let Some(entry) = entries.get_mut(key) {
            entry.value = json!(next);
        }
        Ok(next)
    }

    async fn append_bounded(
        &self,
        key: &str,
        value: Value,
        cap: usize,
        ttl: Duration,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let (mut samples, expires_at) = match entries.get(key) {
            Some(entry) if entry.expires_at > now => (
                entry.value.as_array().cloned().unwrap_or_default(),
                entry.expires_at,
            ),
            _ => (Vec::new(), now + ttl),
        };
        samples.push(value);
        if samples.len() > cap {
            let excess = samples.len() - cap;
            samples.drain(..excess);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: Value::Array(samples),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.clock.now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at.duration_since(now).unwrap_or_default()))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        entries.retain(|_, e| e.expires_at > now);
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn diagnostics(&self) -> Value {
        let entries = match self.lock() {
            Ok(entries) => entries.len(),
            Err(_) => 0,
        };
        json!({ "entries": entries })
    }
}
