//! Prometheus metrics.
//!
//! Janus components record through the `metrics` facade; [`init_metrics`]
//! installs a Prometheus recorder and serves it over HTTP.
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `janus_cache_lookups_total` | Counter | `cache`, `outcome` |
//! | `janus_cache_evictions_total` | Counter | `cache`, `reason` |
//! | `janus_filter_duration_seconds` | Histogram | `name`, `segment` |
//! | `janus_condition_evaluations_total` | Counter | `result` |
//! | `janus_token_resolutions_total` | Counter | `outcome` |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::warn;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names.
pub mod names {
    /// Cache lookups by outcome (`hit`, `miss`).
    pub const CACHE_LOOKUPS: &str = "janus_cache_lookups_total";
    /// Cache evictions by reason (`expired`, `explicit`, `immediate`, `failed`).
    pub const CACHE_EVICTIONS: &str = "janus_cache_evictions_total";
    /// Time spent in timed filters and handlers by segment.
    pub const FILTER_DURATION: &str = "janus_filter_duration_seconds";
    /// Conditional filter evaluations by result.
    pub const CONDITION_EVALUATIONS: &str = "janus_condition_evaluations_total";
    /// Bearer token checks by outcome.
    pub const TOKEN_RESOLUTIONS: &str = "janus_token_resolutions_total";
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether metrics are exported.
    pub enabled: bool,

    /// Listen address of the Prometheus endpoint.
    pub addr: String,

    /// Bucket boundaries, in seconds, for duration histograms.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:9090".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder and starts its HTTP listener.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the address is invalid, there is no runtime, or a
/// recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| TelemetryError::MetricsInit(format!("no Tokio runtime: {e}")))?;

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(names::FILTER_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let (recorder, exporter) = builder
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    runtime.spawn(async move {
        if let Err(error) = exporter.await {
            warn!(error = ?error, "prometheus exporter stopped");
        }
    });

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    Ok(())
}

/// Renders all metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Registers descriptions for every Janus metric.
pub fn describe_metrics() {
    describe_counter!(
        names::CACHE_LOOKUPS,
        Unit::Count,
        "Single-flight cache lookups by outcome"
    );
    describe_counter!(
        names::CACHE_EVICTIONS,
        Unit::Count,
        "Single-flight cache evictions by reason"
    );
    describe_histogram!(
        names::FILTER_DURATION,
        Unit::Seconds,
        "Time spent in timed filters and handlers"
    );
    describe_counter!(
        names::CONDITION_EVALUATIONS,
        Unit::Count,
        "Conditional filter evaluations by result"
    );
    describe_counter!(
        names::TOKEN_RESOLUTIONS,
        Unit::Count,
        "Bearer token checks by outcome"
    );
}
