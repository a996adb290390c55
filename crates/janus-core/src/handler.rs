//! Asynchronous request handlers.
//!
//! A [`Handler`] turns a request into a promise of a response. Handlers never
//! fail: the promise error type is [`Infallible`], and failures are expressed
//! as error responses (see [`GatewayError::into_response`](crate::GatewayError::into_response)).

use crate::context::Context;
use crate::promise::Promise;
use crate::types::{Request, Response};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

/// The promise returned by every handler and filter.
pub type ResponsePromise = Promise<Response, Infallible>;

/// A type-erased handler that can be shared between chains.
pub type SharedHandler = Arc<dyn Handler>;

/// Asynchronous request processor.
///
/// # Example
///
/// ```
/// use janus_core::{Context, Handler, Promise, Request, Response, ResponsePromise};
/// use bytes::Bytes;
/// use http_body_util::Full;
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn handle(&self, _ctx: Context, _request: Request) -> ResponsePromise {
///         Promise::resolved(Response::new(Full::new(Bytes::from_static(b"hello"))))
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Processes `request` within `ctx` and returns a promise of the response.
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise;
}

impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        (**self).handle(ctx, request)
    }
}

impl<H> Handler for Box<H>
where
    H: Handler + ?Sized,
{
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        (**self).handle(ctx, request)
    }
}

/// A handler backed by an async closure.
///
/// Created with [`handler_fn`].
pub struct FnHandler<F> {
    func: F,
}

/// Creates a handler from an async closure.
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FnHandler { func }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        let response = (self.func)(ctx, request);
        Promise::from_future(async move { Ok(response.await) })
    }
}

/// A handler that always answers with the same status, headers and body.
///
/// # Example
///
/// ```
/// use janus_core::StaticResponseHandler;
/// use http::StatusCode;
///
/// let handler = StaticResponseHandler::new(StatusCode::SERVICE_UNAVAILABLE)
///     .header(http::header::RETRY_AFTER, http::HeaderValue::from_static("30"))
///     .body("maintenance");
/// assert_eq!(handler.status(), StatusCode::SERVICE_UNAVAILABLE);
/// ```
#[derive(Debug, Clone)]
pub struct StaticResponseHandler {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl StaticResponseHandler {
    /// Creates a handler answering with `status` and an empty body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The handler used when no backend is configured.
    #[must_use]
    pub fn bad_gateway() -> Self {
        Self::new(StatusCode::BAD_GATEWAY).body("no backend configured")
    }

    /// Adds a response header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status this handler answers with.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl Handler for StaticResponseHandler {
    fn handle(&self, _ctx: Context, _request: Request) -> ResponsePromise {
        let mut response = Response::new(Full::new(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        Promise::resolved(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_fn_handler_sees_context() {
        let handler = handler_fn(|ctx: Context, _req| async move {
            let mut response = Response::new(Full::new(Bytes::new()));
            response.headers_mut().insert(
                "x-request-id",
                HeaderValue::from_str(&ctx.request_id().to_string()).unwrap(),
            );
            response
        });

        let ctx = Context::root();
        let response = handler.handle(ctx.clone(), fixtures::get("/")).value().await;
        assert_eq!(
            response.headers()["x-request-id"],
            ctx.request_id().to_string().as_str()
        );
    }

    #[tokio::test]
    async fn test_static_handler_is_repeatable() {
        let handler = Arc::new(
            StaticResponseHandler::new(StatusCode::IM_A_TEAPOT)
                .header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
                .body("short and stout"),
        );

        for _ in 0..2 {
            let response = handler
                .handle(Context::root(), fixtures::get("/tea"))
                .value()
                .await;
            assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
            assert_eq!(response.headers()[http::header::CONTENT_TYPE], "text/plain");
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"short and stout");
        }
    }

    #[tokio::test]
    async fn test_shared_handler_trait_object() {
        let shared: SharedHandler = Arc::new(StaticResponseHandler::bad_gateway());
        let response = shared.handle(Context::root(), fixtures::get("/")).value().await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
