//! Standard filters.
//!
//! Decorators that wrap another filter or handler:
//!
//! - [`conditional`] - apply a filter only when a condition holds
//! - [`timer`] - measure total, internal and downstream time
//!
//! Request-level filters:
//!
//! - [`base_uri`] - point the request at a backend
//! - [`bearer`] - require a valid bearer token
//!
//! Token resolution:
//!
//! - [`resolution`] - single-flight caching in front of a resolver
//! - [`introspection`] - RFC 7662 introspection client

pub mod base_uri;
pub mod bearer;
pub mod conditional;
pub mod introspection;
pub mod resolution;
pub mod timer;

pub use base_uri::{expression_fn, BaseUriFilter, UriExpression, UriTemplate};
pub use bearer::{BearerTokenFilter, ResolutionError, TokenInfo, TokenResolver};
pub use conditional::{
    condition_fn, Condition, ConditionalFilter, EvaluationError, HeaderCondition,
};
pub use introspection::IntrospectionResolver;
pub use resolution::{resolver_fn, ttl_until, CachedResolver, Expiring, Expiry, Resolver};
pub use timer::{
    Clock, LogRecorder, ManualClock, MemoryRecorder, SystemClock, TimerFilter, TimerHandler,
    TimingRecorder, Timings,
};
