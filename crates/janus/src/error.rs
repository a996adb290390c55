//! Errors raised while assembling a gateway.

use janus_config::ConfigError;
use janus_middleware::stages::ResolutionError;
use thiserror::Error;

/// Failure to build a [`Gateway`](crate::Gateway) from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The introspection client could not be created.
    #[error("cannot create token introspection client: {0}")]
    Introspection(#[from] ResolutionError),

    /// Cache evictions need a Tokio runtime and none is running.
    #[error("no Tokio runtime to schedule cache evictions: {0}")]
    NoRuntime(String),
}
