//! Base URI rewriting.
//!
//! [`BaseUriFilter`] points a request at a backend: the scheme and authority
//! of the request URI are replaced by those of a base URI, the base path is
//! prepended to the request path, and the query is kept. The base URI comes
//! from a [`UriExpression`] evaluated per request.
//!
//! If the expression yields no value, or a value that is not an absolute URI,
//! the request is not forwarded and the filter answers 500.

use crate::filter::{Filter, Next};
use janus_core::{Context, GatewayError, Promise, Request, ResponsePromise};
use http::header::HeaderName;
use http::Uri;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Failure to compute a rebased URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebaseError {
    /// The expression produced no value.
    #[error("base URI expression yielded no value")]
    NoValue,

    /// The expression produced something that is not an absolute URI.
    #[error("invalid base URI '{uri}': {reason}")]
    InvalidBase {
        /// The offending value.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A URI template could not be parsed.
    #[error("invalid URI template: {0}")]
    InvalidTemplate(String),
}

impl RebaseError {
    fn invalid_base(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBase {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

/// Produces a base URI for a request.
pub trait UriExpression: Send + Sync + 'static {
    /// Evaluates the expression; `None` means no value.
    fn evaluate(&self, ctx: &Context, request: &Request) -> Option<String>;
}

impl UriExpression for String {
    fn evaluate(&self, _ctx: &Context, _request: &Request) -> Option<String> {
        Some(self.clone())
    }
}

impl UriExpression for &'static str {
    fn evaluate(&self, _ctx: &Context, _request: &Request) -> Option<String> {
        Some((*self).to_string())
    }
}

/// An expression backed by a closure.
///
/// Created with [`expression_fn`].
pub struct FnExpression<F> {
    func: F,
}

/// Creates a URI expression from a closure.
pub fn expression_fn<F>(func: F) -> FnExpression<F>
where
    F: Fn(&Context, &Request) -> Option<String> + Send + Sync + 'static,
{
    FnExpression { func }
}

impl<F> UriExpression for FnExpression<F>
where
    F: Fn(&Context, &Request) -> Option<String> + Send + Sync + 'static,
{
    fn evaluate(&self, ctx: &Context, request: &Request) -> Option<String> {
        (self.func)(ctx, request)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Header(HeaderName),
}

/// Literal text with `{header:NAME}` placeholders.
///
/// A placeholder is replaced by the value of the named request header. A
/// missing (or non-UTF-8) header makes the whole template yield no value.
///
/// # Example
///
/// ```
/// use janus_core::{fixtures, Context};
/// use janus_middleware::stages::base_uri::{UriExpression, UriTemplate};
///
/// let template = UriTemplate::parse("http://{header:x-backend}:8080/v1").unwrap();
/// let request = fixtures::get_with_header("/", "x-backend", "orders");
/// assert_eq!(
///     template.evaluate(&Context::root(), &request).as_deref(),
///     Some("http://orders:8080/v1")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct UriTemplate {
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parses a template.
    pub fn parse(template: &str) -> Result<Self, RebaseError> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| RebaseError::InvalidTemplate(format!("unclosed placeholder in '{template}'")))?;
            let placeholder = &after[..close];
            let name = placeholder.strip_prefix("header:").ok_or_else(|| {
                RebaseError::InvalidTemplate(format!("unknown placeholder '{{{placeholder}}}'"))
            })?;
            let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| {
                RebaseError::InvalidTemplate(format!("invalid header name '{name}'"))
            })?;
            segments.push(Segment::Header(name));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }
}

impl UriExpression for UriTemplate {
    fn evaluate(&self, _ctx: &Context, request: &Request) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Header(name) => {
                    out.push_str(request.headers().get(name)?.to_str().ok()?);
                }
            }
        }
        Some(out)
    }
}

/// Rebases `original` onto `base`.
///
/// # Example
///
/// ```
/// use janus_middleware::stages::base_uri::rebase;
///
/// let original: http::Uri = "/users/7?full=true".parse().unwrap();
/// let rebased = rebase(&original, "https://backend.internal:8443/api/").unwrap();
/// assert_eq!(rebased.to_string(), "https://backend.internal:8443/api/users/7?full=true");
/// ```
pub fn rebase(original: &Uri, base: &str) -> Result<Uri, RebaseError> {
    let parsed: Uri = base
        .parse()
        .map_err(|e: http::uri::InvalidUri| RebaseError::invalid_base(base, e.to_string()))?;
    let scheme = parsed
        .scheme()
        .ok_or_else(|| RebaseError::invalid_base(base, "missing scheme"))?;
    let authority = parsed
        .authority()
        .ok_or_else(|| RebaseError::invalid_base(base, "missing authority"))?;

    let mut path_and_query = format!(
        "{}{}",
        parsed.path().trim_end_matches('/'),
        original.path()
    );
    if path_and_query.is_empty() {
        path_and_query.push('/');
    }
    if let Some(query) = original.query() {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    Uri::builder()
        .scheme(scheme.clone())
        .authority(authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| RebaseError::invalid_base(base, e.to_string()))
}

/// Points requests at the base URI produced by an expression.
pub struct BaseUriFilter {
    base: Arc<dyn UriExpression>,
}

impl BaseUriFilter {
    /// Rebases requests onto the value of `base`.
    pub fn new<X: UriExpression>(base: X) -> Self {
        Self {
            base: Arc::new(base),
        }
    }
}

impl Filter for BaseUriFilter {
    fn name(&self) -> &'static str {
        "base_uri"
    }

    fn filter(&self, ctx: Context, mut request: Request, next: Next) -> ResponsePromise {
        let rebased = self
            .base
            .evaluate(&ctx, &request)
            .ok_or(RebaseError::NoValue)
            .and_then(|base| rebase(request.uri(), &base));

        match rebased {
            Ok(uri) => {
                debug!(request_id = %ctx.request_id(), from = %request.uri(), to = %uri, "rebased request");
                *request.uri_mut() = uri;
                next.handle(ctx, request)
            }
            Err(rebase_error) => {
                error!(request_id = %ctx.request_id(), error = %rebase_error, "cannot rebase request URI");
                let request_id = ctx.request_id().to_string();
                Promise::resolved(
                    GatewayError::internal_with_source("cannot rebase request URI", rebase_error)
                        .into_response(Some(&request_id)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterExt;
    use janus_core::{fixtures, Handler};
    use http::StatusCode;

    #[test]
    fn test_rebase_keeps_path_and_query() {
        let original: Uri = "/search?q=rust&page=2".parse().unwrap();
        let rebased = rebase(&original, "http://backend:8080").unwrap();
        assert_eq!(rebased.to_string(), "http://backend:8080/search?q=rust&page=2");
    }

    #[test]
    fn test_rebase_replaces_absolute_request_uri() {
        let original: Uri = "http://gateway.example/a/b".parse().unwrap();
        let rebased = rebase(&original, "https://origin.example/base").unwrap();
        assert_eq!(rebased.to_string(), "https://origin.example/base/a/b");
    }

    #[test]
    fn test_rebase_rejects_relative_base() {
        let original: Uri = "/x".parse().unwrap();
        assert!(matches!(
            rebase(&original, "/relative/only"),
            Err(RebaseError::InvalidBase { .. })
        ));
        assert!(matches!(
            rebase(&original, "not a uri"),
            Err(RebaseError::InvalidBase { .. })
        ));
    }

    #[test]
    fn test_template_parse_errors() {
        assert!(UriTemplate::parse("http://{header:x-host").is_err());
        assert!(UriTemplate::parse("http://{query:host}").is_err());
        assert!(UriTemplate::parse("http://{header:bad name}").is_err());
    }

    #[tokio::test]
    async fn test_filter_rebases_before_next() {
        let handler = BaseUriFilter::new("http://backend:9000/api")
            .and_then(fixtures::echo_handler());

        let response = handler
            .handle(Context::root(), fixtures::get("/orders?limit=5"))
            .value()
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[fixtures::ECHO_URI_HEADER],
            "http://backend:9000/api/orders?limit=5"
        );
    }

    #[tokio::test]
    async fn test_missing_value_short_circuits_with_500() {
        let handler = BaseUriFilter::new(UriTemplate::parse("http://{header:x-backend}").unwrap())
            .and_then(fixtures::echo_handler());

        let response = handler
            .handle(Context::root(), fixtures::get("/orders"))
            .value()
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(fixtures::ECHO_URI_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_invalid_value_short_circuits_with_500() {
        let handler = BaseUriFilter::new(expression_fn(|_, _| Some("::::".to_string())))
            .and_then(fixtures::echo_handler());

        let response = handler
            .handle(Context::root(), fixtures::get("/"))
            .value()
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = fixtures::body_string(response).await;
        assert!(body.contains("INTERNAL_ERROR"));
    }
}
