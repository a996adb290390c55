//! Top-level gateway configuration.

use crate::schema::{CacheConfig, IntrospectionConfig, TimerConfig};
use crate::ConfigError;
use janus_telemetry::{LogConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Complete Janus configuration.
///
/// # Example
///
/// ```
/// use janus_config::{CacheConfig, JanusConfig};
/// use janus_core::Ttl;
///
/// let config = JanusConfig::builder()
///     .cache(CacheConfig {
///         default_timeout: Ttl::from_secs(30),
///         max_timeout: None,
///     })
///     .build();
///
/// assert_eq!(config.cache.default_timeout, Ttl::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JanusConfig {
    /// Cache settings.
    pub cache: CacheConfig,

    /// Token introspection settings.
    pub introspection: IntrospectionConfig,

    /// Request timing settings.
    pub timer: TimerConfig,

    /// Logging and metrics settings.
    pub telemetry: TelemetryConfig,
}

impl JanusConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> JanusConfigBuilder {
        JanusConfigBuilder::new()
    }

    /// Checks cross-field constraints that deserialization cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.introspection.enabled {
            let endpoint = self
                .introspection
                .endpoint
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| ConfigError::missing_field("introspection.endpoint"))?;
            validate_endpoint(endpoint)?;
        }

        if self.timer.enabled && self.timer.name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "timer.name",
                "must not be empty when the timer is enabled",
            ));
        }

        if self.telemetry.metrics.enabled
            && self.telemetry.metrics.addr.parse::<SocketAddr>().is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        if self.telemetry.logging.enabled {
            janus_telemetry::logging::create_env_filter(&self.telemetry.logging.level)
                .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;
        }

        Ok(())
    }

    /// Pretty debug logs, no metrics listener.
    #[must_use]
    pub fn development() -> Self {
        Self {
            timer: TimerConfig {
                enabled: true,
                ..TimerConfig::default()
            },
            telemetry: TelemetryConfig {
                logging: LogConfig::development(),
                metrics: janus_telemetry::MetricsConfig {
                    enabled: false,
                    ..Default::default()
                },
                ..TelemetryConfig::default()
            },
            ..Self::default()
        }
    }

    /// JSON logs and metrics.
    #[must_use]
    pub fn production() -> Self {
        Self {
            telemetry: TelemetryConfig {
                logging: LogConfig::production(),
                ..TelemetryConfig::default()
            },
            ..Self::default()
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let uri: http::Uri = endpoint.parse().map_err(|e: http::uri::InvalidUri| {
        ConfigError::invalid_value("introspection.endpoint", e.to_string())
    })?;
    match uri.scheme_str() {
        Some("http" | "https") if uri.authority().is_some() => Ok(()),
        _ => Err(ConfigError::invalid_value(
            "introspection.endpoint",
            format!("expected an absolute http(s) URL, got {endpoint}"),
        )),
    }
}

/// Builder for [`JanusConfig`].
#[derive(Debug, Default)]
pub struct JanusConfigBuilder {
    cache: Option<CacheConfig>,
    introspection: Option<IntrospectionConfig>,
    timer: Option<TimerConfig>,
    telemetry: Option<TelemetryConfig>,
}

impl JanusConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache section.
    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the introspection section.
    #[must_use]
    pub fn introspection(mut self, introspection: IntrospectionConfig) -> Self {
        self.introspection = Some(introspection);
        self
    }

    /// Sets the timer section.
    #[must_use]
    pub fn timer(mut self, timer: TimerConfig) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Sets the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builds the configuration without validating it.
    #[must_use]
    pub fn build(self) -> JanusConfig {
        JanusConfig {
            cache: self.cache.unwrap_or_default(),
            introspection: self.introspection.unwrap_or_default(),
            timer: self.timer.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<JanusConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::Ttl;
    use janus_telemetry::LogFormat;

    fn introspection(endpoint: Option<&str>) -> IntrospectionConfig {
        IntrospectionConfig {
            enabled: true,
            endpoint: endpoint.map(str::to_string),
            client_id: "gateway".to_string(),
            client_secret: "s3cret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = JanusConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.introspection.enabled);
        assert!(!config.timer.enabled);
    }

    #[test]
    fn test_introspection_requires_endpoint() {
        let result = JanusConfig::builder()
            .introspection(introspection(None))
            .build_validated();
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_introspection_endpoint_must_be_http() {
        for endpoint in ["ftp://idp.local/introspect", "/introspect", "not a url"] {
            let result = JanusConfig::builder()
                .introspection(introspection(Some(endpoint)))
                .build_validated();
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { ref field, .. }) if field == "introspection.endpoint"),
                "{endpoint} accepted"
            );
        }

        let ok = JanusConfig::builder()
            .introspection(introspection(Some("https://idp.local/oauth2/introspect")))
            .build_validated();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_invalid_metrics_addr() {
        let mut config = JanusConfig::default();
        config.telemetry.metrics.addr = "metrics.local".to_string();
        assert!(config.validate().is_err());

        config.telemetry.metrics.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = JanusConfig::default();
        config.telemetry.logging.level = "janus=chatty".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_enabled_timer_needs_a_name() {
        let config = JanusConfig::builder()
            .timer(TimerConfig {
                enabled: true,
                name: " ".to_string(),
            })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets() {
        let dev = JanusConfig::development();
        assert_eq!(dev.telemetry.logging.format, LogFormat::Pretty);
        assert!(dev.timer.enabled);
        assert!(!dev.telemetry.metrics.enabled);

        let prod = JanusConfig::production();
        assert_eq!(prod.telemetry.logging.format, LogFormat::Json);
        assert!(prod.telemetry.metrics.enabled);
    }

    #[test]
    fn test_toml_round_trip_keeps_ttls_readable() {
        let config = JanusConfig::builder()
            .cache(CacheConfig {
                default_timeout: Ttl::from_secs(120),
                max_timeout: Some(Ttl::from_secs(3_600)),
            })
            .build();

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains(r#"default_timeout = "2m""#));
        assert!(text.contains(r#"max_timeout = "1h""#));

        let parsed: JanusConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result: Result<JanusConfig, _> = toml::from_str("[server]\nport = 8080");
        assert!(result.is_err());
    }
}
