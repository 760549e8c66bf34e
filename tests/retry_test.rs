use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bifrost::clock::ManualClock;
use bifrost::{Backoff, BifrostError, BreakerStatus, Result, Retrier, RetryPolicy};

/// Work source that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> BifrostError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> BifrostError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }

    async fn call(&self) -> Result<&'static str> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok("ok")
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new()
        .base_delay(Duration::from_millis(1))
        .jitter(0.0)
}

// ============================================================================
// Retry loop
// ============================================================================

#[tokio::test]
async fn retries_on_transient_error_then_succeeds() {
    let work = Arc::new(FailThenSucceed::new(2, || BifrostError::RateLimited {
        retry_after: None,
    }));
    let retrier = Retrier::new(fast_policy().max_retries(3));

    let result = retrier.execute("chat", "openai", || work.call()).await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(work.call_count(), 3); // 2 failures + 1 success
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let work = Arc::new(FailThenSucceed::new(10, || {
        BifrostError::Transport("timeout".into())
    }));
    let retrier = Retrier::new(fast_policy().max_retries(2));

    let err = retrier
        .execute("chat", "openai", || work.call())
        .await
        .unwrap_err();

    assert_eq!(work.call_count(), 3); // initial attempt + 2 retries
    match err {
        BifrostError::RetriesExhausted {
            operation,
            provider,
            attempts,
            ..
        } => {
            assert_eq!(operation, "chat");
            assert_eq!(provider, "openai");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn does_not_retry_permanent_errors() {
    let work = Arc::new(FailThenSucceed::new(1, || {
        BifrostError::AuthenticationFailed("openai".into())
    }));
    let retrier = Retrier::new(fast_policy().max_retries(5));

    let result = retrier.execute("chat", "openai", || work.call()).await;

    assert!(matches!(result, Err(BifrostError::AuthenticationFailed(_))));
    assert_eq!(work.call_count(), 1); // no retry
}

#[tokio::test]
async fn respects_retry_after_hint() {
    let work = Arc::new(FailThenSucceed::new(1, || BifrostError::RateLimited {
        retry_after: Some(Duration::from_millis(50)),
    }));
    let retrier = Retrier::new(fast_policy().max_retries(2));

    let start = std::time::Instant::now();
    let result = retrier.execute("chat", "openai", || work.call()).await;
    let elapsed = start.elapsed();

    assert!(result.is_ok());
    // Should have waited the 50ms hint, not the 1ms base delay
    assert!(elapsed >= Duration::from_millis(40)); // some tolerance
}

#[tokio::test]
async fn disabled_policy_makes_a_single_attempt() {
    let work = Arc::new(FailThenSucceed::new(1, || BifrostError::RateLimited {
        retry_after: None,
    }));
    let retrier = Retrier::new(RetryPolicy::disabled());

    let result = retrier.execute("chat", "openai", || work.call()).await;

    assert!(result.is_err());
    assert_eq!(work.call_count(), 1);
}

#[tokio::test]
async fn backoff_delays_accumulate_across_attempts() {
    let work = Arc::new(FailThenSucceed::new(2, || {
        BifrostError::Transport("connection reset".into())
    }));
    let policy = RetryPolicy::new()
        .max_retries(2)
        .base_delay(Duration::from_millis(50))
        .strategy(Backoff::Exponential)
        .jitter(0.0);
    let retrier = Retrier::new(policy);

    let start = std::time::Instant::now();
    let result = retrier.execute("chat", "groq", || work.call()).await;
    let elapsed = start.elapsed();

    assert!(result.is_ok());
    // 50ms after the first failure, 100ms after the second
    assert!(elapsed >= Duration::from_millis(130));
    assert_eq!(work.call_count(), 3);
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[tokio::test]
async fn circuit_opens_after_threshold_failures() {
    let work = Arc::new(FailThenSucceed::new(u32::MAX, || {
        BifrostError::Transport("timeout".into())
    }));
    let policy = fast_policy().max_retries(0).circuit_threshold(3);
    let retrier = Retrier::new(policy);

    for _ in 0..3 {
        let _ = retrier.execute("chat", "openai", || work.call()).await;
    }
    assert_eq!(work.call_count(), 3);

    let err = retrier
        .execute("chat", "openai", || work.call())
        .await
        .unwrap_err();

    assert!(matches!(err, BifrostError::CircuitOpen { .. }));
    assert_eq!(work.call_count(), 3); // rejected without invoking the work

    let report = retrier.circuit_status("chat", "openai");
    assert_eq!(report.status, BreakerStatus::Open);
    assert_eq!(report.failure_count, 3);
}

#[tokio::test]
async fn circuits_are_scoped_per_operation_and_provider() {
    let work = Arc::new(FailThenSucceed::new(u32::MAX, || {
        BifrostError::Transport("timeout".into())
    }));
    let policy = fast_policy().max_retries(0).circuit_threshold(2);
    let retrier = Retrier::new(policy);

    for _ in 0..2 {
        let _ = retrier.execute("chat", "openai", || work.call()).await;
    }
    assert_eq!(
        retrier.circuit_status("chat", "openai").status,
        BreakerStatus::Open
    );

    // Other pairs are untouched
    assert_eq!(
        retrier.circuit_status("chat", "groq").status,
        BreakerStatus::Closed
    );
    assert_eq!(
        retrier.circuit_status("embed", "openai").status,
        BreakerStatus::Closed
    );
}

#[tokio::test]
async fn open_circuit_recovers_after_the_cooloff() {
    let clock = Arc::new(ManualClock::new());
    let work = Arc::new(FailThenSucceed::new(2, || {
        BifrostError::Transport("timeout".into())
    }));
    let policy = fast_policy()
        .max_retries(0)
        .circuit_threshold(2)
        .circuit_timeout(Duration::from_secs(60));
    let retrier = Retrier::with_clock(policy, clock.clone());

    for _ in 0..2 {
        let _ = retrier.execute("chat", "openai", || work.call()).await;
    }
    assert_eq!(
        retrier.circuit_status("chat", "openai").status,
        BreakerStatus::Open
    );

    clock.advance(Duration::from_secs(61));
    assert_eq!(
        retrier.circuit_status("chat", "openai").status,
        BreakerStatus::HalfOpen
    );

    // The probe succeeds and the circuit closes again
    let result = retrier.execute("chat", "openai", || work.call()).await;
    assert!(result.is_ok());
    assert_eq!(
        retrier.circuit_status("chat", "openai").status,
        BreakerStatus::Closed
    );
}

#[tokio::test]
async fn reset_clears_the_circuit_immediately() {
    let work = Arc::new(FailThenSucceed::new(2, || {
        BifrostError::Transport("timeout".into())
    }));
    let policy = fast_policy().max_retries(0).circuit_threshold(2);
    let retrier = Retrier::new(policy);

    for _ in 0..2 {
        let _ = retrier.execute("chat", "openai", || work.call()).await;
    }
    assert_eq!(
        retrier.circuit_status("chat", "openai").status,
        BreakerStatus::Open
    );

    retrier.reset_circuit("chat", "openai");

    let report = retrier.circuit_status("chat", "openai");
    assert_eq!(report.status, BreakerStatus::Closed);
    assert_eq!(report.failure_count, 0);

    let result = retrier.execute("chat", "openai", || work.call()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn disabled_breaker_never_opens() {
    let work = Arc::new(FailThenSucceed::new(u32::MAX, || {
        BifrostError::Transport("timeout".into())
    }));
    let policy = fast_policy()
        .max_retries(0)
        .circuit_breaker(false)
        .circuit_threshold(1);
    let retrier = Retrier::new(policy);

    for _ in 0..5 {
        let err = retrier
            .execute("chat", "openai", || work.call())
            .await
            .unwrap_err();
        assert!(!matches!(err, BifrostError::CircuitOpen { .. }));
    }
    assert_eq!(work.call_count(), 5);
}

// ============================================================================
// Per-call policy override
// ============================================================================

#[tokio::test]
async fn execute_with_shares_breaker_state_across_policies() {
    let work = Arc::new(FailThenSucceed::new(u32::MAX, || {
        BifrostError::Transport("timeout".into())
    }));
    let retrier = Retrier::new(fast_policy().max_retries(0).circuit_threshold(2));
    let override_policy = fast_policy().max_retries(0).circuit_threshold(2);

    let _ = retrier.execute("chat", "openai", || work.call()).await;
    let _ = retrier
        .execute_with("chat", "openai", &override_policy, || work.call())
        .await;

    // Both calls fed the same circuit
    assert_eq!(
        retrier.circuit_status("chat", "openai").status,
        BreakerStatus::Open
    );
}
