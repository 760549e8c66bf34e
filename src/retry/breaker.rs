//! Per-(operation, provider) circuit breaker state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;

/// Snapshot of one circuit, as exposed by
/// [`Retrier::circuit_status`](super::Retrier::circuit_status).
#[derive(Debug, Clone, Serialize)]
pub struct CircuitReport {
    pub status: BreakerStatus,
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
}

/// Derived circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Below the failure threshold; requests flow normally.
    Closed,
    /// Threshold reached and the cool-off window is still running.
    Open,
    /// Threshold reached but the cool-off window has elapsed; the next
    /// request probes the upstream and clears the circuit on its way in.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct BreakerState {
    failure_count: u32,
    last_failure_at: SystemTime,
}

/// Failure bookkeeping for every (operation, provider) pair, shared across
/// concurrent calls through the owning [`Retrier`](super::Retrier).
pub(crate) struct CircuitBreakers {
    clock: Arc<dyn Clock>,
    state: Mutex<HashMap<(String, String), BreakerState>>,
}

impl CircuitBreakers {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the circuit currently rejects requests. An expired cool-off
    /// window clears the entry here, so the probing request starts from a
    /// closed circuit.
    pub(crate) fn is_open(
        &self,
        operation: &str,
        provider: &str,
        threshold: u32,
        timeout: Duration,
    ) -> bool {
        // A poisoned lock never blocks requests.
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let key = (operation.to_owned(), provider.to_owned());
        match state.get(&key) {
            Some(entry) if entry.failure_count >= threshold => {
                let elapsed = self
                    .clock
                    .now()
                    .duration_since(entry.last_failure_at)
                    .unwrap_or_default();
                if elapsed < timeout {
                    true
                } else {
                    state.remove(&key);
                    false
                }
            }
            _ => false,
        }
    }

    pub(crate) fn record_failure(&self, operation: &str, provider: &str) {
        if let Ok(mut state) = self.state.lock() {
            let entry = state
                .entry((operation.to_owned(), provider.to_owned()))
                .or_insert(BreakerState {
                    failure_count: 0,
                    last_failure_at: self.clock.now(),
                });
            entry.failure_count += 1;
            entry.last_failure_at = self.clock.now();
        }
    }

    pub(crate) fn reset(&self, operation: &str, provider: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.remove(&(operation.to_owned(), provider.to_owned()));
        }
    }

    /// Read-only derivation; unlike [`is_open`](Self::is_open) this never
    /// clears expired state.
    pub(crate) fn report(
        &self,
        operation: &str,
        provider: &str,
        threshold: u32,
        timeout: Duration,
    ) -> CircuitReport {
        let entry = self
            .state
            .lock()
            .ok()
            .and_then(|state| state.get(&(operation.to_owned(), provider.to_owned())).copied());
        match entry {
            None => CircuitReport {
                status: BreakerStatus::Closed,
                failure_count: 0,
                last_failure: None,
            },
            Some(entry) => {
                let status = if entry.failure_count < threshold {
                    BreakerStatus::Closed
                } else {
                    let elapsed = self
                        .clock
                        .now()
                        .duration_since(entry.last_failure_at)
                        .unwrap_or_default();
                    if elapsed < timeout {
                        BreakerStatus::Open
                    } else {
                        BreakerStatus::HalfOpen
                    }
                };
                CircuitReport {
                    status,
                    failure_count: entry.failure_count,
                    last_failure: Some(entry.last_failure_at.into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const THRESHOLD: u32 = 3;
    const TIMEOUT: Duration = Duration::from_secs(60);

    fn breakers() -> (Arc<ManualClock>, CircuitBreakers) {
        let clock = Arc::new(ManualClock::new());
        (clock.clone(), CircuitBreakers::new(clock))
    }

    #[test]
    fn opens_at_threshold() {
        let (_, breakers) = breakers();
        for _ in 0..THRESHOLD - 1 {
            breakers.record_failure("chat", "openai");
            assert!(!breakers.is_open("chat", "openai", THRESHOLD, TIMEOUT));
        }
        breakers.record_failure("chat", "openai");
        assert!(breakers.is_open("chat", "openai", THRESHOLD, TIMEOUT));
    }

    #[test]
    fn circuits_are_isolated_per_operation_and_provider() {
        let (_, breakers) = breakers();
        for _ in 0..THRESHOLD {
            breakers.record_failure("chat", "openai");
        }
        assert!(breakers.is_open("chat", "openai", THRESHOLD, TIMEOUT));
        assert!(!breakers.is_open("embed", "openai", THRESHOLD, TIMEOUT));
        assert!(!breakers.is_open("chat", "groq", THRESHOLD, TIMEOUT));
    }

    #[test]
    fn expired_timeout_clears_the_circuit() {
        let (clock, breakers) = breakers();
        for _ in 0..THRESHOLD {
            breakers.record_failure("chat", "openai");
        }
        clock.advance(TIMEOUT);
        assert!(!breakers.is_open("chat", "openai", THRESHOLD, TIMEOUT));
        // The clearing reset also forgot the failure history.
        let report = breakers.report("chat", "openai", THRESHOLD, TIMEOUT);
        assert_eq!(report.status, BreakerStatus::Closed);
        assert_eq!(report.failure_count, 0);
    }

    #[test]
    fn report_derives_half_open_without_clearing() {
        let (clock, breakers) = breakers();
        for _ in 0..THRESHOLD {
            breakers.record_failure("chat", "openai");
        }
        let report = breakers.report("chat", "openai", THRESHOLD, TIMEOUT);
        assert_eq!(report.status, BreakerStatus::Open);
        assert_eq!(report.failure_count, THRESHOLD);
        assert!(report.last_failure.is_some());

        clock.advance(TIMEOUT);
        let report = breakers.report("chat", "openai", THRESHOLD, TIMEOUT);
        assert_eq!(report.status, BreakerStatus::HalfOpen);
        assert_eq!(report.failure_count, THRESHOLD);
    }

    #[test]
    fn manual_reset_closes_the_circuit() {
        let (_, breakers) = breakers();
        for _ in 0..THRESHOLD {
            breakers.record_failure("chat", "openai");
        }
        breakers.reset("chat", "openai");
        assert!(!breakers.is_open("chat", "openai", THRESHOLD, TIMEOUT));
    }
}
