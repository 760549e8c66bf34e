//! Fixed-window request limiting per provider, backed by the KV store.
//!
//! Each provider with a configured limit gets one counter key
//! `bifrost_ratelimit:{provider}` whose TTL is the window. The counter is
//! bumped atomically through [`KvStore::increment`], and the TTL counts
//! from the first request of the window, so the window never slides under
//! sustained traffic. Providers without a configured limit are never
//! throttled, and store failures fail open: losing the limiter must not
//! take down the gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::store::KvStore;
use crate::{BifrostError, Result};

const RATELIMIT_PREFIX: &str = "bifrost_ratelimit";

const DEFAULT_MAX_REQUESTS: u64 = 100;
const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Per-provider limit: at most `max_requests` per fixed `window`.
///
/// ```rust
/// # use std::time::Duration;
/// # use bifrost::RateLimitConfig;
/// let config = RateLimitConfig::new()
///     .max_requests(500)
///     .window(Duration::from_secs(60));
/// assert_eq!(config.max_requests, 500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_requests(mut self, max: u64) -> Self {
        self.max_requests = max;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Snapshot of one provider's window at check time.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests already counted in the active window.
    pub current: u64,
    pub max: u64,
    pub window: Duration,
    /// When the active window expires; `None` when no window is open yet.
    pub reset_at: Option<DateTime<Utc>>,
}

/// Fixed-window limiter over the shared [`KvStore`].
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    limits: HashMap<String, RateLimitConfig>,
}

impl RateLimiter {
    /// A limiter with no limits configured; every provider is unlimited
    /// until [`limit`](Self::limit) adds one.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            limits: HashMap::new(),
        }
    }

    /// Replace the clock used for reset timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configure a limit for one provider.
    pub fn limit(mut self, provider: impl Into<String>, config: RateLimitConfig) -> Self {
        self.limits.insert(provider.into(), config);
        self
    }

    pub fn is_limited(&self, provider: &str) -> bool {
        self.limits.contains_key(provider)
    }

    /// Inspect the provider's window without consuming a slot.
    ///
    /// Returns `None` when the provider has no configured limit. Store
    /// read failures report an empty window.
    pub async fn check(&self, provider: &str) -> Option<RateLimitDecision> {
        let config = self.limits.get(provider)?;
        let key = limit_key(provider);

        let current = match self.store.get(&key).await {
            Ok(value) => value.and_then(|v| v.as_u64()).unwrap_or(0),
            Err(e) => {
                warn!(provider, error = %e, "rate limit read failed, assuming empty window");
                0
            }
        };
        let reset_at = match self.store.remaining_ttl(&key).await {
            Ok(remaining) => {
                let now: DateTime<Utc> = self.clock.now().into();
                remaining.map(|ttl| now + chrono::Duration::from_std(ttl).unwrap_or_default())
            }
            Err(_) => None,
        };

        Some(RateLimitDecision {
            allowed: current < config.max_requests,
            current,
            max: config.max_requests,
            window: config.window,
            reset_at,
        })
    }

    /// Consume one request slot, or fail with
    /// [`BifrostError::RateLimited`] when the window is exhausted.
    ///
    /// Unlimited providers always succeed. A store that cannot count
    /// fails open: the request is allowed and the failure logged.
    pub async fn acquire(&self, provider: &str) -> Result<()> {
        let Some(decision) = self.check(provider).await else {
            return Ok(());
        };

        if !decision.allowed {
            let retry_after = decision
                .reset_at
                .map(|at| {
                    let now: DateTime<Utc> = self.clock.now().into();
                    (at - now).to_std().unwrap_or_default()
                })
                .unwrap_or(decision.window);
            warn!(
                provider,
                current = decision.current,
                max = decision.max,
                "rate limit exceeded"
            );
            return Err(BifrostError::RateLimited {
                retry_after: Some(retry_after),
            });
        }

        if let Err(e) = self
            .store
            .increment(&limit_key(provider), decision.window)
            .await
        {
            warn!(provider, error = %e, "rate limit increment failed, allowing request");
        }
        Ok(())
    }
}

fn limit_key(provider: &str) -> String {
    format!("{RATELIMIT_PREFIX}:{provider}")
}
