//! # Janus
//!
//! **Programmable HTTP gateway core**
//!
//! Janus runs every request through a chain of filters in front of a
//! terminal handler. Each element answers with a [`Promise`](core::Promise)
//! instead of blocking, and expensive per-request lookups such as token
//! introspection go through a single-flight TTL cache, so N concurrent
//! misses for one key cost one computation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use janus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("janus.toml")?
//!         .with_env_prefix("JANUS")
//!         .load()?;
//!     janus::telemetry::init_telemetry(&config.telemetry)?;
//!
//!     let backend = handler_fn(|_ctx, _req| async { Response::with_status(StatusCode::OK) });
//!     let gateway = Gateway::from_config(&config, backend)?;
//!     // hand requests from your HTTP server to `gateway.handle(request)`
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Gateway (root Context) → Filter → … → Filter → Handler
//!                                                            ↓
//! Response ← x-request-id ← ─────── Promise<Response> ───────┘
//! ```

#![doc(html_root_url = "https://docs.rs/janus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod gateway;

pub use error::BuildError;
pub use gateway::{configure_cache, Gateway, TokenCache, REQUEST_ID_HEADER};

// Re-export core types
pub use janus_core as core;

// Re-export the cache
pub use janus_cache as cache;

// Re-export filters and chains
pub use janus_middleware as middleware;

// Re-export configuration
pub use janus_config as config;

// Re-export telemetry setup
pub use janus_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use janus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{BuildError, Gateway};

    pub use janus_core::{
        handler_fn, Context, GatewayError, Handler, Promise, Request, RequestId, Response,
        ResponseExt, ResponsePromise, Ttl,
    };

    pub use janus_cache::{Cache, CacheError, Scheduler, TokioScheduler};

    pub use janus_middleware::stages::{
        BaseUriFilter, BearerTokenFilter, CachedResolver, ConditionalFilter, TimerFilter,
        TimerHandler,
    };
    pub use janus_middleware::{filter_fn, Chain, Filter, FilterExt, Next};

    pub use janus_config::{ConfigLoader, JanusConfig};

    pub use http::StatusCode;
}
