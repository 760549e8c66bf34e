//! Serialization of metrics reports for external monitoring systems.

use std::str::FromStr;

use crate::telemetry;
use crate::{BifrostError, Result};

use super::engine::MetricsReport;

/// Output format for [`MetricsEngine::export`](super::MetricsEngine::export).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Prometheus,
}

impl FromStr for ExportFormat {
    type Err = BifrostError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "prometheus" => Ok(ExportFormat::Prometheus),
            other => Err(BifrostError::InvalidInput(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

/// Render a report in the Prometheus text exposition format.
///
/// Request totals are always emitted; the duration gauge only when the
/// window produced samples and the success rate only when the pair saw
/// traffic, so scrapes never report a fake zero for an idle pair.
pub(crate) fn to_prometheus(report: &MetricsReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "# HELP {} Total number of AI requests\n",
        telemetry::REQUESTS_TOTAL
    ));
    out.push_str(&format!("# TYPE {} counter\n", telemetry::REQUESTS_TOTAL));
    out.push_str(&format!(
        "# HELP {} Average AI request duration in seconds\n",
        telemetry::REQUEST_DURATION_SECONDS
    ));
    out.push_str(&format!(
        "# TYPE {} gauge\n",
        telemetry::REQUEST_DURATION_SECONDS
    ));
    out.push_str(&format!(
        "# HELP {} AI request success rate percentage\n",
        telemetry::SUCCESS_RATE
    ));
    out.push_str(&format!("# TYPE {} gauge\n", telemetry::SUCCESS_RATE));

    for (provider, per_op) in &report.providers {
        for (operation, metrics) in per_op {
            let labels = format!("provider=\"{provider}\",operation=\"{operation}\"");

            out.push_str(&format!(
                "{}{{{labels}}} {}\n",
                telemetry::REQUESTS_TOTAL,
                metrics.total
            ));

            if metrics.response_time.avg > 0.0 {
                out.push_str(&format!(
                    "{}{{{labels}}} {}\n",
                    telemetry::REQUEST_DURATION_SECONDS,
                    metrics.response_time.avg / 1000.0
                ));
            }

            if metrics.total > 0 {
                let rate = metrics.success as f64 / metrics.total as f64 * 100.0;
                out.push_str(&format!(
                    "{}{{{labels}}} {rate}\n",
                    telemetry::SUCCESS_RATE
                ));
            }
        }
    }

    out
}
