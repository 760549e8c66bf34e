//! Retry policies, delay calculation, and the circuit-breaking executor.
//!
//! Provides [`RetryPolicy`] for controlling retry behaviour and [`Retrier`],
//! which wraps async upstream calls with automatic retry on transient errors
//! and a per-(operation, provider) circuit breaker.
//!
//! All gateway operations funnel through [`Retrier::execute_with`], keeping
//! retry logic in a single place.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::telemetry;
use crate::{BifrostError, Result};

mod breaker;

pub use breaker::{BreakerStatus, CircuitReport};

use breaker::CircuitBreakers;

/// Delay growth strategy between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Every delay equals the base delay.
    Fixed,
    /// `base_delay * (attempt + 1)`.
    Linear,
    /// `base_delay * 2^attempt`.
    #[default]
    Exponential,
}

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff by default, with symmetric jitter and a circuit
/// breaker. Supports both gateway-wide defaults and per-call overrides via
/// the builder:
///
/// ```rust
/// # use bifrost::{Backoff, RetryPolicy};
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(200))
///     .strategy(Backoff::Linear);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt. 0 = single attempt.
    /// Default: 3.
    pub max_retries: u32,
    /// Base delay before the first retry. Default: 1s.
    pub base_delay: Duration,
    /// Maximum delay between retries (caps backoff growth). Default: 60s.
    pub max_delay: Duration,
    /// How delays grow across attempts. Default: [`Backoff::Exponential`].
    pub strategy: Backoff,
    /// Jitter fraction applied symmetrically to each delay; 0.0 disables.
    /// Default: 0.1 (±10%).
    pub jitter: f64,
    /// Whether the circuit breaker guards this call. Default: true.
    pub circuit_breaker: bool,
    /// Consecutive failures before the circuit opens. Default: 5.
    pub circuit_threshold: u32,
    /// Cool-off window while the circuit stays open. Default: 60s.
    pub circuit_timeout: Duration,
    classifier: Option<Arc<dyn Fn(&BifrostError) -> bool + Send + Sync>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            strategy: Backoff::Exponential,
            jitter: 0.1,
            circuit_breaker: true,
            circuit_threshold: 5,
            circuit_timeout: Duration::from_secs(60),
            classifier: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("strategy", &self.strategy)
            .field("jitter", &self.jitter)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("circuit_threshold", &self.circuit_threshold)
            .field("circuit_timeout", &self.circuit_timeout)
            .field("classifier", &self.classifier.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl RetryPolicy {
    /// Create a new policy with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the maximum retries after the initial attempt.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff strategy.
    pub fn strategy(mut self, strategy: Backoff) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the jitter fraction (0.0 disables jitter).
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction;
        self
    }

    /// Enable or disable the circuit breaker.
    pub fn circuit_breaker(mut self, enabled: bool) -> Self {
        self.circuit_breaker = enabled;
        self
    }

    /// Set the consecutive-failure threshold that opens the circuit.
    pub fn circuit_threshold(mut self, n: u32) -> Self {
        self.circuit_threshold = n;
        self
    }

    /// Set the cool-off window an open circuit waits before probing again.
    pub fn circuit_timeout(mut self, timeout: Duration) -> Self {
        self.circuit_timeout = timeout;
        self
    }

    /// Replace the retryability classifier. The default delegates to
    /// [`BifrostError::is_transient`].
    pub fn classifier(
        mut self,
        classify: impl Fn(&BifrostError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Some(Arc::new(classify));
        self
    }

    /// Whether an error should be retried under this policy.
    pub fn is_retryable(&self, error: &BifrostError) -> bool {
        match &self.classifier {
            Some(classify) => classify(error),
            None => error.is_transient(),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Applies the configured strategy, capped at `max_delay`. Does NOT
    /// include jitter — see [`effective_delay()`](Self::effective_delay)
    /// for the full calculation.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = match self.strategy {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential => self.base_delay.saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting provider `retry_after` hints.
    ///
    /// If a `retry_after` duration is provided (from a `RateLimited` error),
    /// it takes precedence over the calculated backoff and is used verbatim;
    /// otherwise the computed backoff is jittered.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint,
            None => jittered(self.delay_for_attempt(attempt), self.jitter),
        }
    }
}

/// Spread a delay by ±(delay × fraction), clamped non-negative. Sourced from
/// the wall clock's subsecond nanos rather than a rand dependency.
fn jittered(delay: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 {
        return delay;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since_epoch| since_epoch.subsec_nanos())
        .unwrap_or(0);
    let unit = f64::from(nanos) / 1_000_000_000.0; // [0, 1)
    let offset = delay.as_secs_f64() * fraction * (unit * 2.0 - 1.0);
    Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
}

/// Executes async upstream calls under a [`RetryPolicy`] and owns the
/// circuit breaker state shared by every call that flows through it.
pub struct Retrier {
    policy: RetryPolicy,
    breakers: CircuitBreakers,
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Retrier {
    /// Create a retrier with the given default policy, timing the circuit
    /// breaker off the system clock.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Create a retrier with an explicit clock for the circuit breaker.
    pub fn with_clock(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            breakers: CircuitBreakers::new(clock),
        }
    }

    /// The default policy used by [`execute`](Self::execute).
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `work` under the retrier's default policy.
    pub async fn execute<F, Fut, T>(&self, operation: &str, provider: &str, work: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with(operation, provider, &self.policy, work)
            .await
    }

    /// Execute `work` with retry and circuit breaking.
    ///
    /// Checks the circuit first: an open circuit fails with
    /// [`BifrostError::CircuitOpen`] without invoking `work`. Transient
    /// errors (per the policy classifier) are retried up to
    /// `policy.max_retries` times with backoff; the final transient failure
    /// is wrapped in [`BifrostError::RetriesExhausted`] with the attempt
    /// count. Permanent errors are returned immediately without retry.
    ///
    /// The inter-attempt sleep is the only suspension point; dropping the
    /// returned future cancels any pending delay.
    pub async fn execute_with<F, Fut, T>(
        &self,
        operation: &str,
        provider: &str,
        policy: &RetryPolicy,
        work: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if policy.circuit_breaker
            && self.breakers.is_open(
                operation,
                provider,
                policy.circuit_threshold,
                policy.circuit_timeout,
            )
        {
            return Err(BifrostError::CircuitOpen {
                operation: operation.to_owned(),
                provider: provider.to_owned(),
            });
        }

        let attempts = policy.max_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            match work().await {
                Ok(result) => {
                    if attempt > 0 {
                        if policy.circuit_breaker {
                            self.breakers.reset(operation, provider);
                        }
                        info!(
                            provider,
                            operation,
                            attempt = attempt + 1,
                            "succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if policy.is_retryable(&e) => {
                    metrics::counter!(telemetry::RETRIES_TOTAL,
                        "provider" => provider.to_owned(),
                        "operation" => operation.to_owned(),
                    )
                    .increment(1);
                    if policy.circuit_breaker {
                        self.breakers.record_failure(operation, provider);
                    }
                    if attempt + 1 >= attempts {
                        error!(provider, operation, attempts, error = %e, "all retry attempts failed");
                        return Err(BifrostError::RetriesExhausted {
                            operation: operation.to_owned(),
                            provider: provider.to_owned(),
                            attempts,
                            source: Box::new(e),
                        });
                    }
                    let delay = policy.effective_delay(attempt, e.retry_after());
                    warn!(
                        provider,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e), // permanent error, no retry
            }
        }
    }

    /// Snapshot the circuit for one (operation, provider) pair, judged
    /// against the retrier's default threshold and timeout.
    pub fn circuit_status(&self, operation: &str, provider: &str) -> CircuitReport {
        self.breakers.report(
            operation,
            provider,
            self.policy.circuit_threshold,
            self.policy.circuit_timeout,
        )
    }

    /// Manually close the circuit for one (operation, provider) pair.
    pub fn reset_circuit(&self, operation: &str, provider: &str) {
        self.breakers.reset(operation, provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delays_never_grow() {
        let policy = RetryPolicy::new()
            .strategy(Backoff::Fixed)
            .base_delay(Duration::from_secs(2));
        for attempt in 0..5 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_secs(2));
        }
    }

    #[test]
    fn linear_delays_grow_by_base() {
        let policy = RetryPolicy::new()
            .strategy(Backoff::Linear)
            .base_delay(Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(3));
    }

    #[test]
    fn exponential_delays_double() {
        let policy = RetryPolicy::new().base_delay(Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn delays_cap_at_max() {
        let policy = RetryPolicy::new()
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));

        let linear = policy.strategy(Backoff::Linear);
        assert_eq!(linear.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_hint_beats_backoff() {
        let policy = RetryPolicy::new().base_delay(Duration::from_secs(1));
        let hint = Some(Duration::from_secs(42));
        assert_eq!(policy.effective_delay(3, hint), Duration::from_secs(42));
    }

    #[test]
    fn jitter_stays_within_the_fraction() {
        let delay = Duration::from_secs(10);
        for _ in 0..100 {
            let spread = jittered(delay, 0.1);
            assert!(spread >= Duration::from_secs(9));
            assert!(spread <= Duration::from_secs(11));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        assert_eq!(
            jittered(Duration::from_secs(10), 0.0),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn custom_classifier_overrides_default() {
        let policy = RetryPolicy::new().classifier(|e| matches!(e, BifrostError::EmptyResponse));
        assert!(policy.is_retryable(&BifrostError::EmptyResponse));
        assert!(!policy.is_retryable(&BifrostError::Transport("timeout".into())));
    }
}
