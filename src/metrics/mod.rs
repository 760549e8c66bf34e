//! Call metrics: recording, aggregation, health verdicts and export.
//!
//! # Architecture
//!
//! [`MetricsEngine`] is the write and read side in one: the gateway records
//! one [`MetricRecord`] per call, and introspection endpoints query the
//! same store for windowed reports, provider health and performance
//! rollups. Everything lives in the shared [`KvStore`](crate::store::KvStore)
//! under `bifrost_metrics:` keys with a 24 hour TTL, so a shared store
//! (e.g. Redis-backed) gives every gateway process the same view.
//!
//! This subsystem is the queryable history. Live counters for scrape-based
//! collectors are emitted separately through the `metrics` facade, under
//! the names in [`telemetry`](crate::telemetry).

mod engine;
mod export;
mod health;

pub use engine::{
    MetricRecord, MetricsEngine, MetricsReport, MetricsSummary, OperationMetrics,
    PerformanceStats, Period, ProviderStatus, ProviderSummary, ResponseTimeStats,
    TokenUsageStats,
};
pub use export::ExportFormat;
pub use health::{HealthReport, HealthStatus, OverallHealth, ProviderHealth};
