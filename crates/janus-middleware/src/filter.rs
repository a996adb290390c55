//! Filter contract.
//!
//! A [`Filter`] sits in front of a handler. It receives the context, the
//! request and a [`Next`] that stands for everything downstream. A filter may
//!
//! - pass the request (possibly modified, possibly with a derived context)
//!   to `next`,
//! - short-circuit and answer on its own without calling `next`,
//! - transform the response promised by `next`.
//!
//! [`Next`] is consumed when invoked, so a filter calls its successor at most
//! once.
//!
//! # Example
//!
//! ```
//! use janus_core::{fixtures, Context, Handler};
//! use janus_middleware::{filter_fn, FilterExt};
//!
//! # tokio_test::block_on(async {
//! let stamp = filter_fn("stamp", |ctx, mut request, next| async move {
//!     request.headers_mut().insert("x-stamped", http::HeaderValue::from_static("yes"));
//!     next.handle(ctx, request).value().await
//! });
//!
//! let handler = stamp.and_then(fixtures::echo_handler());
//! let response = handler.handle(Context::root(), fixtures::get("/")).value().await;
//! assert_eq!(response.headers()["x-stamped"], "yes");
//! # });
//! ```

use janus_core::{Context, Handler, Promise, Request, Response, ResponsePromise, SharedHandler};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A type-erased filter that can be stored in a chain.
pub type BoxedFilter = Arc<dyn Filter>;

/// Request/response interceptor placed in front of a handler.
pub trait Filter: Send + Sync + 'static {
    /// Returns the name of this filter, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Processes `request`, delegating to `next` zero or one time.
    fn filter(&self, ctx: Context, request: Request, next: Next) -> ResponsePromise;
}

impl<F> Filter for Arc<F>
where
    F: Filter + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn filter(&self, ctx: Context, request: Request, next: Next) -> ResponsePromise {
        (**self).filter(ctx, request, next)
    }
}

/// The rest of the chain, as seen by a filter.
///
/// `Next` is deliberately not `Clone`: [`handle`](Self::handle) consumes it.
pub struct Next {
    handler: SharedHandler,
}

impl Next {
    /// Creates a `Next` that forwards to `handler`.
    pub fn new(handler: SharedHandler) -> Self {
        Self { handler }
    }

    /// Creates a `Next` from any handler.
    pub fn from_handler<H: Handler>(handler: H) -> Self {
        Self::new(Arc::new(handler))
    }

    /// Invokes the rest of the chain.
    pub fn handle(self, ctx: Context, request: Request) -> ResponsePromise {
        self.handler.handle(ctx, request)
    }

    /// Unwraps the downstream handler, e.g. to wrap it in another handler.
    pub fn into_handler(self) -> SharedHandler {
        self.handler
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// A filter that can be created from an async closure.
///
/// Created with [`filter_fn`].
pub struct FnFilter<F> {
    name: &'static str,
    func: F,
}

impl<F> FnFilter<F> {
    /// Creates a new function-based filter.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

/// Creates a filter from an async closure.
pub fn filter_fn<F, Fut>(name: &'static str, func: F) -> FnFilter<F>
where
    F: Fn(Context, Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FnFilter::new(name, func)
}

impl<F, Fut> Filter for FnFilter<F>
where
    F: Fn(Context, Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn filter(&self, ctx: Context, request: Request, next: Next) -> ResponsePromise {
        let response = (self.func)(ctx, request, next);
        Promise::from_future(async move { Ok(response.await) })
    }
}

/// A filter placed in front of a handler, usable as a handler itself.
///
/// Created with [`FilterExt::and_then`].
pub struct Filtered<F> {
    filter: F,
    handler: SharedHandler,
}

impl<F: Filter> Handler for Filtered<F> {
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        self.filter
            .filter(ctx, request, Next::new(Arc::clone(&self.handler)))
    }
}

/// Convenience methods for filters.
pub trait FilterExt: Filter + Sized {
    /// Places this filter in front of `handler`.
    fn and_then<H: Handler>(self, handler: H) -> Filtered<Self> {
        Filtered {
            filter: self,
            handler: Arc::new(handler),
        }
    }

    /// Places this filter in front of an already shared handler.
    fn and_then_shared(self, handler: SharedHandler) -> Filtered<Self> {
        Filtered {
            filter: self,
            handler,
        }
    }
}

impl<F: Filter> FilterExt for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::{fixtures, ResponseExt, StaticResponseHandler};
    use http::StatusCode;

    struct Deny;

    impl Filter for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn filter(&self, _ctx: Context, _request: Request, _next: Next) -> ResponsePromise {
            Promise::resolved(Response::error(StatusCode::FORBIDDEN, "denied"))
        }
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let handler = Deny.and_then(StaticResponseHandler::new(StatusCode::OK));
        let response = handler
            .handle(Context::root(), fixtures::get("/"))
            .value()
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_filter_can_extend_context() {
        #[derive(Debug, PartialEq)]
        struct Tenant(&'static str);

        let tenant = filter_fn("tenant", |ctx: Context, request, next: Next| async move {
            next.handle(ctx.with_value(Tenant("acme")), request).value().await
        });
        let handler = tenant.and_then(janus_core::handler_fn(|ctx: Context, _req| async move {
            let status = if ctx.get::<Tenant>() == Some(&Tenant("acme")) {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Response::with_status(status)
        }));

        let response = handler
            .handle(Context::root(), fixtures::get("/"))
            .value()
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_filter_transforms_response() {
        let tag = filter_fn("tag", |ctx, request, next: Next| async move {
            let mut response = next.handle(ctx, request).value().await;
            response
                .headers_mut()
                .insert("x-filtered", http::HeaderValue::from_static("1"));
            response
        });
        assert_eq!(tag.name(), "tag");

        let response = tag
            .and_then(fixtures::echo_handler())
            .handle(Context::root(), fixtures::get("/"))
            .value()
            .await;
        assert_eq!(response.headers()["x-filtered"], "1");
    }
}
