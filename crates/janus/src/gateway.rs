//! Pipeline entry point.
//!
//! A [`Gateway`] owns the outermost handler. For every inbound request it
//! creates the root [`Context`], reusing a valid `x-request-id` header when
//! one is present, and stamps that ID on the response.

use crate::error::BuildError;
use http::HeaderValue;
use janus_cache::{Cache, TokioScheduler};
use janus_config::{CacheConfig, ConfigError, JanusConfig};
use janus_core::{Context, Handler, Request, RequestId, ResponsePromise, SharedHandler};
use janus_middleware::stages::{
    BearerTokenFilter, CachedResolver, IntrospectionResolver, ResolutionError, TimerHandler,
    TokenInfo,
};
use janus_middleware::Chain;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Header carrying the request ID in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Cache holding introspected tokens.
pub type TokenCache = Cache<String, TokenInfo, ResolutionError>;

/// Entry point that turns inbound requests into pipeline invocations.
///
/// # Example
///
/// ```
/// use janus::{Gateway, REQUEST_ID_HEADER};
/// use janus::core::fixtures;
///
/// # tokio_test::block_on(async {
/// let gateway = Gateway::new(fixtures::echo_handler());
/// let response = gateway.handle(fixtures::get("/orders")).value().await;
/// assert!(response.headers().contains_key(REQUEST_ID_HEADER));
/// # });
/// ```
pub struct Gateway {
    handler: SharedHandler,
    stages: Vec<&'static str>,
    token_cache: Option<TokenCache>,
    trust_incoming: bool,
}

impl Gateway {
    /// Serves every request with `handler`.
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            stages: Vec::new(),
            token_cache: None,
            trust_incoming: true,
        }
    }

    /// Serves every request with `chain`.
    #[must_use]
    pub fn from_chain(chain: Chain) -> Self {
        let stages = chain.stage_names();
        Self {
            stages,
            ..Self::new(chain)
        }
    }

    /// Assembles the standard chain described by `config` in front of `handler`.
    ///
    /// With introspection enabled, requests pass a [`BearerTokenFilter`]
    /// whose tokens are cached until they expire. The cache TTL is capped
    /// by the smaller of `cache.max_timeout` and
    /// `introspection.cache_max_timeout`; without either, tokens that never
    /// expire stay cached until [`shutdown`](Self::shutdown).
    /// With the timer enabled, the whole chain is timed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the configuration is invalid, the HTTP
    /// client cannot be built, or introspection is enabled outside a Tokio
    /// runtime.
    pub fn from_config<H: Handler>(config: &JanusConfig, handler: H) -> Result<Self, BuildError> {
        config.validate()?;

        let mut builder = Chain::builder();
        let mut token_cache = None;
        if config.introspection.enabled {
            let (filter, cache) = token_filter(config)?;
            builder = builder.filter(filter);
            token_cache = Some(cache);
        }

        let chain = builder.handler(handler);
        let stages = chain.stage_names();
        let handler: SharedHandler = if config.timer.enabled {
            Arc::new(TimerHandler::new(config.timer.name.clone(), chain))
        } else {
            Arc::new(chain)
        };

        info!(
            stages = ?stages,
            timed = config.timer.enabled,
            "gateway assembled"
        );
        Ok(Self {
            handler,
            stages,
            token_cache,
            trust_incoming: true,
        })
    }

    /// Whether an inbound `x-request-id` is reused. Defaults to `true`.
    #[must_use]
    pub fn trust_incoming_request_id(mut self, trust: bool) -> Self {
        self.trust_incoming = trust;
        self
    }

    /// Filter names in invocation order.
    #[must_use]
    pub fn stage_names(&self) -> &[&'static str] {
        &self.stages
    }

    /// The token cache, when introspection is enabled.
    #[must_use]
    pub fn token_cache(&self) -> Option<&TokenCache> {
        self.token_cache.as_ref()
    }

    /// Creates the root context for `request`.
    #[must_use]
    pub fn context_for(&self, request: &Request) -> Context {
        let inbound = self
            .trust_incoming
            .then(|| request.headers().get(REQUEST_ID_HEADER))
            .flatten()
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<RequestId>().ok());

        match inbound {
            Some(request_id) => Context::with_request_id(request_id),
            None => Context::root(),
        }
    }

    /// Runs `request` through the pipeline.
    pub fn handle(&self, request: Request) -> ResponsePromise {
        let ctx = self.context_for(&request);
        let request_id = ctx.request_id();
        debug!(
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
            "request received"
        );

        self.handler.handle(ctx, request).then(move |mut response| {
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    }

    /// Drops every cached token and cancels pending evictions.
    pub fn shutdown(&self) {
        if let Some(cache) = &self.token_cache {
            cache.shutdown();
        }
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("stages", &self.stages)
            .field("token_cache", &self.token_cache.as_ref().map(Cache::size))
            .field("trust_incoming", &self.trust_incoming)
            .finish_non_exhaustive()
    }
}

/// Applies the `[cache]` section to `cache`.
///
/// The default timeout only matters for values without a TTL of their own;
/// resolver caches replace it with one derived from each value's expiry.
pub fn configure_cache<K, V, E>(cache: &Cache<K, V, E>, config: &CacheConfig)
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    cache.set_default_timeout(config.default_timeout);
    cache.set_max_timeout(config.max_duration());
}

fn token_filter(config: &JanusConfig) -> Result<(BearerTokenFilter, TokenCache), BuildError> {
    let section = &config.introspection;
    let endpoint = section
        .endpoint
        .as_deref()
        .ok_or_else(|| ConfigError::missing_field("introspection.endpoint"))?;
    let introspection = IntrospectionResolver::new(
        endpoint,
        section.client_id.clone(),
        section.client_secret.clone(),
    )?;
    let scheduler =
        TokioScheduler::try_current().map_err(|e| BuildError::NoRuntime(e.to_string()))?;

    let cache: TokenCache = Cache::named("tokens", Arc::new(scheduler));
    configure_cache(&cache, &config.cache);
    cache.set_max_timeout(token_cap(config));
    let tokens = CachedResolver::with_cache(introspection, cache.clone());

    let filter = BearerTokenFilter::new(tokens)
        .required_scopes(section.required_scopes.iter().cloned())
        .realm(section.realm.clone());
    Ok((filter, cache))
}

fn token_cap(config: &JanusConfig) -> Option<Duration> {
    let section = config
        .introspection
        .cache_max_timeout
        .and_then(|ttl| ttl.as_duration());
    match (config.cache.max_duration(), section) {
        (Some(global), Some(section)) => Some(global.min(section)),
        (global, section) => global.or(section),
    }
}
