//! Time-bucketed metric recording and query-time aggregation.
//!
//! Every recorded call lands in two [`KvStore`] buckets, a daily one and an
//! hourly one, keyed
//! `bifrost_metrics:{provider}:{operation}:{metric}:{date}[:{hour}]` with a
//! 24 hour TTL. Counters (`total`, `success`, `failure`, `cache_hit`,
//! `cache_miss`) are atomic increments; response times and token usage go
//! into per-bucket ring buffers capped at the last 100 samples. Queries walk
//! the hourly buckets across the requested window and aggregate at read
//! time, so averages are only as good as the samples each bucket retained.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::store::KvStore;
use crate::types::TokenUsage;
use crate::{BifrostError, Result};

use super::export::{self, ExportFormat};
use super::health::{self, HealthReport};

const METRICS_PREFIX: &str = "bifrost_metrics";
const METRICS_TTL: Duration = Duration::from_secs(86_400);
const RING_CAP: usize = 100;

const COUNTERS: [&str; 5] = ["total", "success", "failure", "cache_hit", "cache_miss"];
const OPERATIONS: [&str; 3] = ["chat", "stream", "embed"];
const DEFAULT_PROVIDERS: [&str; 3] = ["openai", "anthropic", "groq"];

/// Trailing query window for [`MetricsEngine::metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Period {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Period {
    pub fn hours(self) -> i64 {
        match self {
            Period::OneHour => 1,
            Period::SixHours => 6,
            Period::Day => 24,
            Period::Week => 168,
            Period::Month => 720,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Period::OneHour => "1h",
            Period::SixHours => "6h",
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
        };
        f.write_str(label)
    }
}

impl FromStr for Period {
    type Err = BifrostError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1h" => Ok(Period::OneHour),
            "6h" => Ok(Period::SixHours),
            "24h" => Ok(Period::Day),
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            other => Err(BifrostError::InvalidInput(format!(
                "unknown metrics period: {other}"
            ))),
        }
    }
}

/// One observation of a gateway call, built incrementally by the caller.
///
/// Only the fields that are set are recorded; `total` is bumped
/// unconditionally.
#[derive(Debug, Clone, Default)]
pub struct MetricRecord {
    pub success: Option<bool>,
    pub response_time_ms: Option<f64>,
    pub token_usage: Option<TokenUsage>,
    pub cache_hit: Option<bool>,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(mut self, ok: bool) -> Self {
        self.success = Some(ok);
        self
    }

    pub fn response_time_ms(mut self, ms: f64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    pub fn cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = Some(hit);
        self
    }
}

/// Aggregated view over one trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub period: Period,
    pub generated_at: DateTime<Utc>,
    /// provider -> operation -> aggregates.
    pub providers: BTreeMap<String, BTreeMap<String, OperationMetrics>>,
    pub summary: MetricsSummary,
}

/// Aggregates for one (provider, operation) pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationMetrics {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
    pub response_time: ResponseTimeStats,
    pub token_usage: TokenUsageStats,
}

/// Response time aggregates in milliseconds; all zero when no samples.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResponseTimeStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenUsageStats {
    pub total: u64,
    pub avg: f64,
}

/// Cross-provider rollup attached to every [`MetricsReport`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time: f64,
    pub cache_hit_rate: f64,
    pub providers_status: BTreeMap<String, ProviderSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub status: ProviderStatus,
    pub requests: u64,
    pub success_rate: f64,
}

/// Traffic-based provider standing in the summary, judged on failure rate
/// alone. Liveness verdicts with thresholds live in
/// [`health`](super::health).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    NoData,
    Healthy,
    Degraded,
    Critical,
}

/// 24-hour performance rollup returned by [`MetricsEngine::performance`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    pub avg_response_time: f64,
    /// Index into the sorted per-operation average response times at the
    /// 0.95 position. An approximation over pre-averaged values, not a true
    /// percentile of raw samples.
    pub p95_response_time: f64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
}

/// Records and aggregates per-(provider, operation) call metrics in the
/// shared [`KvStore`]. See module docs for the bucket layout.
pub struct MetricsEngine {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    providers: Vec<String>,
}

impl MetricsEngine {
    /// Create an engine over the given store, tracking the default provider
    /// set and timestamping off the system clock.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            providers: DEFAULT_PROVIDERS.iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    /// Replace the clock used for bucket timestamps and query windows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the provider set iterated by unfiltered queries and health
    /// checks.
    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.providers = providers;
        self
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Record one observation into the daily and hourly buckets.
    ///
    /// Storage failures are logged and swallowed; recording must never
    /// abort the call being observed.
    pub async fn record(&self, provider: &str, operation: &str, record: MetricRecord) {
        let now: DateTime<Utc> = self.clock.now().into();
        let date = now.format("%Y-%m-%d").to_string();
        let hour = now.format("%H").to_string();

        self.bump(provider, operation, "total", &date, &hour).await;

        match record.success {
            Some(true) => self.bump(provider, operation, "success", &date, &hour).await,
            Some(false) => self.bump(provider, operation, "failure", &date, &hour).await,
            None => {}
        }

        if let Some(ms) = record.response_time_ms {
            self.append(provider, operation, "response_time", json!(ms), &date, &hour)
                .await;
        }

        if let Some(usage) = record.token_usage
            && let Ok(sample) = serde_json::to_value(usage)
        {
            self.append(provider, operation, "token_usage", sample, &date, &hour)
                .await;
        }

        if let Some(hit) = record.cache_hit {
            let metric = if hit { "cache_hit" } else { "cache_miss" };
            self.bump(provider, operation, metric, &date, &hour).await;
        }
    }

    /// Aggregate the trailing window, optionally filtered to one provider
    /// and/or operation. Unreadable buckets count as empty.
    pub async fn metrics(
        &self,
        provider: Option<&str>,
        operation: Option<&str>,
        period: Period,
    ) -> MetricsReport {
        let end: DateTime<Utc> = self.clock.now().into();
        let start = end - chrono::Duration::hours(period.hours());

        let providers: Vec<String> = match provider {
            Some(name) => vec![name.to_owned()],
            None => self.providers.clone(),
        };
        let operations: Vec<String> = match operation {
            Some(op) => vec![op.to_owned()],
            None => OPERATIONS.iter().map(|op| (*op).to_owned()).collect(),
        };

        let mut tree = BTreeMap::new();
        for prov in &providers {
            let mut per_op = BTreeMap::new();
            for op in &operations {
                per_op.insert(op.clone(), self.window_metrics(prov, op, start, end).await);
            }
            tree.insert(prov.clone(), per_op);
        }

        let summary = summarize(&tree);
        MetricsReport {
            period,
            generated_at: end,
            providers: tree,
            summary,
        }
    }

    /// Liveness verdict per tracked provider over the trailing hour.
    pub async fn health(&self) -> HealthReport {
        let mut providers = BTreeMap::new();
        for provider in self.providers.clone() {
            let report = self.metrics(Some(&provider), None, Period::OneHour).await;
            let per_op = report
                .providers
                .get(&provider)
                .cloned()
                .unwrap_or_default();
            providers.insert(provider, health::evaluate_provider(&per_op));
        }
        let overall = health::overall(&providers);
        HealthReport {
            timestamp: self.clock.now().into(),
            providers,
            overall,
        }
    }

    /// 24-hour performance rollup, optionally filtered to one provider.
    pub async fn performance(&self, provider: Option<&str>) -> PerformanceStats {
        let report = self.metrics(provider, None, Period::Day).await;

        let mut stats = PerformanceStats::default();
        let mut avg_times = Vec::new();
        for per_op in report.providers.values() {
            for metrics in per_op.values() {
                stats.total_requests += metrics.total;
                stats.total_tokens += metrics.token_usage.total;
                if metrics.response_time.avg > 0.0 {
                    avg_times.push(metrics.response_time.avg);
                }
            }
        }

        if !avg_times.is_empty() {
            avg_times.sort_by(f64::total_cmp);
            stats.avg_response_time = avg_times.iter().sum::<f64>() / avg_times.len() as f64;
            let idx = (avg_times.len() as f64 * 0.95) as usize;
            stats.p95_response_time = avg_times.get(idx).copied().unwrap_or_default();
        }

        let (successes, cache_hits) = report.providers.values().fold((0u64, 0u64), |acc, ops| {
            ops.values().fold(acc, |(s, h), m| {
                (s + m.success, h + m.cache_hit)
            })
        });
        if stats.total_requests > 0 {
            stats.success_rate = successes as f64 / stats.total_requests as f64 * 100.0;
            stats.cache_hit_rate = cache_hits as f64 / stats.total_requests as f64 * 100.0;
        }
        stats
    }

    /// Serialize the 24-hour report for external monitoring systems.
    pub async fn export(&self, format: ExportFormat) -> Result<String> {
        let report = self.metrics(None, None, Period::Day).await;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&report)?),
            ExportFormat::Prometheus => Ok(export::to_prometheus(&report)),
        }
    }

    async fn window_metrics(
        &self,
        provider: &str,
        operation: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> OperationMetrics {
        let mut metrics = OperationMetrics::default();
        let mut response_times: Vec<f64> = Vec::new();
        let mut token_samples: Vec<Value> = Vec::new();

        let mut current = start;
        while current <= end {
            let date = current.format("%Y-%m-%d").to_string();
            let hour = current.format("%H").to_string();

            for (name, slot) in COUNTERS.iter().zip([
                &mut metrics.total,
                &mut metrics.success,
                &mut metrics.failure,
                &mut metrics.cache_hit,
                &mut metrics.cache_miss,
            ]) {
                *slot += self
                    .read_count(&hourly_key(provider, operation, name, &date, &hour))
                    .await;
            }

            let times = self
                .read_samples(&hourly_key(provider, operation, "response_time", &date, &hour))
                .await;
            response_times.extend(times.iter().filter_map(Value::as_f64));

            token_samples.extend(
                self.read_samples(&hourly_key(provider, operation, "token_usage", &date, &hour))
                    .await,
            );

            current += chrono::Duration::hours(1);
        }

        if !response_times.is_empty() {
            let count = response_times.len() as f64;
            metrics.response_time.avg = response_times.iter().sum::<f64>() / count;
            metrics.response_time.min =
                response_times.iter().copied().fold(f64::INFINITY, f64::min);
            metrics.response_time.max = response_times
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
        }

        let totals: Vec<u64> = token_samples
            .iter()
            .filter_map(|sample| sample.get("total_tokens").and_then(Value::as_u64))
            .collect();
        if !totals.is_empty() {
            metrics.token_usage.total = totals.iter().sum();
            metrics.token_usage.avg = metrics.token_usage.total as f64 / totals.len() as f64;
        }

        metrics
    }

    async fn bump(&self, provider: &str, operation: &str, metric: &str, date: &str, hour: &str) {
        for key in bucket_keys(provider, operation, metric, date, hour) {
            if let Err(e) = self.store.increment(&key, METRICS_TTL).await {
                debug!(key = %key, error = %e, "failed to increment metric counter");
            }
        }
    }

    async fn append(
        &self,
        provider: &str,
        operation: &str,
        metric: &str,
        sample: Value,
        date: &str,
        hour: &str,
    ) {
        for key in bucket_keys(provider, operation, metric, date, hour) {
            if let Err(e) = self
                .store
                .append_bounded(&key, sample.clone(), RING_CAP, METRICS_TTL)
                .await
            {
                debug!(key = %key, error = %e, "failed to record metric sample");
            }
        }
    }

    async fn read_count(&self, key: &str) -> u64 {
        match self.store.get(key).await {
            Ok(value) => value.and_then(|v| v.as_u64()).unwrap_or(0),
            Err(e) => {
                debug!(key = %key, error = %e, "failed to read metric counter");
                0
            }
        }
    }

    async fn read_samples(&self, key: &str) -> Vec<Value> {
        match self.store.get(key).await {
            Ok(Some(Value::Array(samples))) => samples,
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!(key = %key, error = %e, "failed to read metric samples");
                Vec::new()
            }
        }
    }
}

fn bucket_keys(
    provider: &str,
    operation: &str,
    metric: &str,
    date: &str,
    hour: &str,
) -> [String; 2] {
    [
        format!("{METRICS_PREFIX}:{provider}:{operation}:{metric}:{date}"),
        format!("{METRICS_PREFIX}:{provider}:{operation}:{metric}:{date}:{hour}"),
    ]
}

fn hourly_key(provider: &str, operation: &str, metric: &str, date: &str, hour: &str) -> String {
    format!("{METRICS_PREFIX}:{provider}:{operation}:{metric}:{date}:{hour}")
}

fn summarize(tree: &BTreeMap<String, BTreeMap<String, OperationMetrics>>) -> MetricsSummary {
    let mut summary = MetricsSummary::default();
    let mut response_times = Vec::new();
    let mut total_cache_hits = 0u64;

    for (provider, per_op) in tree {
        let mut provider_total = 0u64;
        let mut provider_success = 0u64;
        let mut provider_failure = 0u64;

        for metrics in per_op.values() {
            provider_total += metrics.total;
            provider_success += metrics.success;
            provider_failure += metrics.failure;
            total_cache_hits += metrics.cache_hit;
            if metrics.response_time.avg > 0.0 {
                response_times.push(metrics.response_time.avg);
            }
        }

        summary.providers_status.insert(
            provider.clone(),
            ProviderSummary {
                status: provider_status(provider_total, provider_failure),
                requests: provider_total,
                success_rate: if provider_total > 0 {
                    provider_success as f64 / provider_total as f64 * 100.0
                } else {
                    0.0
                },
            },
        );

        summary.total_requests += provider_total;
        summary.successful_requests += provider_success;
        summary.failed_requests += provider_failure;
    }

    if !response_times.is_empty() {
        summary.avg_response_time = response_times.iter().sum::<f64>() / response_times.len() as f64;
    }
    if summary.total_requests > 0 {
        summary.cache_hit_rate = total_cache_hits as f64 / summary.total_requests as f64 * 100.0;
    }
    summary
}

fn provider_status(total: u64, failure: u64) -> ProviderStatus {
    if total == 0 {
        return ProviderStatus::NoData;
    }
    if failure == 0 {
        return ProviderStatus::Healthy;
    }
    let failure_rate = failure as f64 / total as f64 * 100.0;
    if failure_rate < 5.0 {
        ProviderStatus::Degraded
    } else {
        ProviderStatus::Critical
    }
}
