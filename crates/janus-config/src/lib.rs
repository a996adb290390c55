//! # Janus Config
//!
//! Typed configuration for the Janus gateway.
//!
//! Configuration is layered: defaults, then a TOML or JSON file, then a
//! `.env` file, then environment variables. Every section rejects unknown
//! keys, and [`JanusConfig::validate`] checks the constraints between them.
//!
//! ```toml
//! [cache]
//! default_timeout = "60s"
//! max_timeout = "15m"
//!
//! [introspection]
//! enabled = true
//! endpoint = "https://idp.example.com/oauth2/introspect"
//! client_id = "gateway"
//! client_secret = "change-me"
//! required_scopes = ["orders:read"]
//!
//! [timer]
//! enabled = true
//! name = "edge"
//!
//! [telemetry.logging]
//! level = "info,janus_cache=debug"
//! format = "json"
//! ```
//!
//! Any key can be overridden from the environment, e.g.
//! `JANUS__INTROSPECTION__CLIENT_SECRET` or `JANUS__TELEMETRY__METRICS__ADDR`.

#![doc(html_root_url = "https://docs.rs/janus-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{JanusConfig, JanusConfigBuilder};
pub use error::ConfigError;
pub use loader::{parse_bool, ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{CacheConfig, IntrospectionConfig, TimerConfig};

pub use janus_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
