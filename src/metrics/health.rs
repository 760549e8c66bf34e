//! Provider liveness verdicts derived from trailing-hour metrics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::engine::OperationMetrics;

/// Point-in-time health snapshot across all tracked providers.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub providers: BTreeMap<String, ProviderHealth>,
    pub overall: OverallHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub total_requests: u64,
    /// Human-readable reasons for any non-healthy status.
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    /// No traffic in the window; counts as neither healthy nor unhealthy.
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

/// Judge one provider from its per-operation aggregates.
///
/// Success rate below 90% is critical, below 95% a warning. An average
/// response time above 5000ms downgrades an otherwise healthy provider to
/// a warning and is always reported as an issue.
pub(crate) fn evaluate_provider(per_op: &BTreeMap<String, OperationMetrics>) -> ProviderHealth {
    let mut total_requests = 0u64;
    let mut total_successes = 0u64;
    let mut response_times = Vec::new();

    for metrics in per_op.values() {
        total_requests += metrics.total;
        total_successes += metrics.success;
        if metrics.response_time.avg > 0.0 {
            response_times.push(metrics.response_time.avg);
        }
    }

    if total_requests == 0 {
        return ProviderHealth {
            status: HealthStatus::NoData,
            success_rate: 100.0,
            avg_response_time: 0.0,
            total_requests: 0,
            issues: Vec::new(),
        };
    }

    let success_rate = total_successes as f64 / total_requests as f64 * 100.0;
    let avg_response_time = if response_times.is_empty() {
        0.0
    } else {
        response_times.iter().sum::<f64>() / response_times.len() as f64
    };

    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();

    if success_rate < 90.0 {
        status = HealthStatus::Critical;
        issues.push(format!("Low success rate: {success_rate:.1}%"));
    } else if success_rate < 95.0 {
        status = HealthStatus::Warning;
        issues.push(format!("Degraded success rate: {success_rate:.1}%"));
    }

    if avg_response_time > 5000.0 {
        if status == HealthStatus::Healthy {
            status = HealthStatus::Warning;
        }
        issues.push(format!("High response time: {avg_response_time:.0}ms"));
    }

    ProviderHealth {
        status,
        success_rate,
        avg_response_time,
        total_requests,
        issues,
    }
}

/// Fold per-provider verdicts into one overall verdict. Providers without
/// traffic are ignored; every active provider unhealthy is critical, any
/// one unhealthy is degraded.
pub(crate) fn overall(providers: &BTreeMap<String, ProviderHealth>) -> OverallHealth {
    let active = providers
        .values()
        .filter(|p| p.status != HealthStatus::NoData)
        .count();
    let unhealthy = providers
        .values()
        .filter(|p| matches!(p.status, HealthStatus::Warning | HealthStatus::Critical))
        .count();

    if unhealthy == 0 {
        OverallHealth::Healthy
    } else if unhealthy == active {
        OverallHealth::Critical
    } else {
        OverallHealth::Degraded
    }
}
