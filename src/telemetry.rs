//! Telemetry metric name constants.
//!
//! Centralised metric names for bifrost operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! These names are also used by the Prometheus text export of the
//! KV-backed metrics engine, so both surfaces stay consistent.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `bifrost_`. Counters end in `_total`,
//! gauges and histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider` — provider name (e.g. "openai", "groq")
//! - `operation` — operation invoked ("chat", "stream", "embed")
//! - `status` — outcome: "ok" or "error"
//! - `direction` — token direction: "prompt" or "completion"

/// Total requests dispatched through the gateway.
///
/// Labels: `provider`, `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "bifrost_requests_total";

/// Request duration in seconds.
///
/// Labels: `provider`, `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "bifrost_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const RETRIES_TOTAL: &str = "bifrost_retries_total";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "bifrost_tokens_total";

/// Total response-cache hits.
///
/// Labels: `provider`, `operation`.
pub const CACHE_HITS_TOTAL: &str = "bifrost_cache_hits_total";

/// Total response-cache misses.
///
/// Labels: `provider`, `operation`.
pub const CACHE_MISSES_TOTAL: &str = "bifrost_cache_misses_total";

/// Success-rate gauge, only present in the Prometheus text export.
///
/// Labels: `provider`, `operation`.
pub const SUCCESS_RATE: &str = "bifrost_success_rate";
