//! # Janus Telemetry
//!
//! Logging and metrics setup for the Janus gateway.
//!
//! - **Logging**: `tracing` records formatted by `tracing-subscriber`, as
//!   JSON in production or pretty-printed in development
//! - **Metrics**: Prometheus exposition of the counters and histograms
//!   recorded by the cache and the standard filters
//!
//! # Example
//!
//! ```rust,ignore
//! use janus_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder()
//!         .service_name("edge-gateway")
//!         .metrics_addr("0.0.0.0:9090")
//!         .build();
//!
//!     init_telemetry(&config).expect("telemetry");
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/janus-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use self::metrics::{describe_metrics, init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(
        service = %config.service_name,
        metrics = config.metrics.enabled,
        "telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_disabled() {
        let config = TelemetryConfig {
            logging: LogConfig {
                enabled: false,
                ..Default::default()
            },
            metrics: MetricsConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(init_telemetry(&config).is_ok());
    }
}
