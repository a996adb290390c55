//! Bearer token enforcement.
//!
//! [`BearerTokenFilter`] extracts the token from `Authorization: Bearer ...`,
//! resolves it through a [`CachedResolver`] and either forwards the request
//! with the resolved [`TokenInfo`] in the context or answers on its own:
//!
//! | Situation                         | Response                         |
//! |-----------------------------------|----------------------------------|
//! | no bearer token                   | 401 + `WWW-Authenticate` challenge |
//! | token inactive or expired         | 401 `invalid_token`              |
//! | token lacks a required scope      | 403 `insufficient_scope`         |
//! | resolver unreachable or malformed | 502                              |
//! | resolution interrupted            | 500                              |

use crate::filter::{Filter, Next};
use crate::stages::resolution::{CachedResolver, Expiring, Expiry};
use chrono::{DateTime, Utc};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue};
use janus_cache::CacheError;
use janus_core::{Context, GatewayError, Promise, Request, Response, ResponsePromise};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Introspected token data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Whether the authorization server considers the token active.
    pub active: bool,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Resource owner.
    pub subject: Option<String>,
    /// Client the token was issued to.
    pub client_id: Option<String>,
    /// Expiry instant, if the token has one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenInfo {
    /// A token the authorization server does not recognise.
    pub fn inactive() -> Self {
        Self {
            active: false,
            scopes: Vec::new(),
            subject: None,
            client_id: None,
            expires_at: None,
        }
    }

    /// Returns `true` if the token is active and not expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |at| at > now)
    }

    /// Returns the required scopes this token lacks.
    pub fn missing_scopes<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        let granted: HashSet<&str> = self.scopes.iter().map(String::as_str).collect();
        required
            .iter()
            .map(String::as_str)
            .filter(|scope| !granted.contains(scope))
            .collect()
    }
}

impl Expiring for TokenInfo {
    fn expiry(&self) -> Expiry {
        if !self.active {
            return Expiry::At(DateTime::<Utc>::MIN_UTC);
        }
        self.expires_at.map_or(Expiry::Never, Expiry::At)
    }
}

/// Failure of a token resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The authorization server could not be reached or refused to answer.
    #[error("token resolver unavailable: {0}")]
    Unavailable(String),

    /// The authorization server answered something that is not a valid answer.
    #[error("malformed token resolver answer: {0}")]
    Malformed(String),
}

impl ResolutionError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Malformed(_) => "malformed",
        }
    }

    /// Maps this failure to the error answered to the client.
    pub fn to_gateway_error(&self) -> GatewayError {
        GatewayError::external(self.to_string(), Some("token-introspection"))
    }
}

/// Resolver type accepted by [`BearerTokenFilter`].
pub type TokenResolver = CachedResolver<String, TokenInfo, ResolutionError>;

/// Requires a valid bearer token on every request.
pub struct BearerTokenFilter {
    resolver: TokenResolver,
    required_scopes: Vec<String>,
    realm: String,
}

impl BearerTokenFilter {
    /// Default realm announced in challenges.
    pub const DEFAULT_REALM: &'static str = "janus";

    /// Validates tokens with `resolver`.
    pub fn new(resolver: TokenResolver) -> Self {
        Self {
            resolver,
            required_scopes: Vec::new(),
            realm: Self::DEFAULT_REALM.to_string(),
        }
    }

    /// Requires every token to carry all of `scopes`.
    #[must_use]
    pub fn required_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the realm announced in challenges.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }
}

impl Filter for BearerTokenFilter {
    fn name(&self) -> &'static str {
        "bearer_token"
    }

    fn filter(&self, ctx: Context, request: Request, next: Next) -> ResponsePromise {
        let request_id = ctx.request_id().to_string();

        let Some(token) = bearer_token(request.headers()) else {
            debug!(request_id = %request_id, "request without bearer token");
            record_resolution("missing");
            let response = GatewayError::authentication("bearer token required")
                .into_response(Some(&request_id));
            return Promise::resolved(challenge(response, &self.realm, None));
        };

        let lookup = self.resolver.resolve(&ctx, token.to_string());
        let required = self.required_scopes.clone();
        let realm = self.realm.clone();

        Promise::from_future(async move {
            match lookup.await {
                Ok(info) if !info.is_valid_at(Utc::now()) => {
                    info!(request_id = %request_id, "rejected inactive or expired token");
                    record_resolution("invalid");
                    let response = GatewayError::authentication_with_reason(
                        "token is inactive or expired",
                        "invalid_token",
                    )
                    .into_response(Some(&request_id));
                    Ok(challenge(response, &realm, Some("invalid_token")))
                }
                Ok(info) => {
                    let missing = info.missing_scopes(&required);
                    if missing.is_empty() {
                        record_resolution("valid");
                        debug!(request_id = %request_id, subject = ?info.subject, "token accepted");
                        return next.handle(ctx.with_value(info), request).await;
                    }
                    info!(request_id = %request_id, missing = ?missing, "token lacks required scopes");
                    record_resolution("insufficient_scope");
                    let response = GatewayError::authorization_with_reason(
                        format!("missing scopes: {}", missing.join(" ")),
                        "insufficient_scope",
                    )
                    .into_response(Some(&request_id));
                    Ok(challenge(response, &realm, Some("insufficient_scope")))
                }
                Err(CacheError::Compute(resolution_error)) => {
                    warn!(request_id = %request_id, error = %resolution_error, "token resolution failed");
                    record_resolution(resolution_error.outcome());
                    Ok(resolution_error
                        .to_gateway_error()
                        .into_response(Some(&request_id)))
                }
                Err(CacheError::Interrupted(reason)) => {
                    error!(request_id = %request_id, reason = %reason, "token resolution interrupted");
                    record_resolution("interrupted");
                    Ok(GatewayError::internal(format!("token resolution interrupted: {reason}"))
                        .into_response(Some(&request_id)))
                }
            }
        })
    }
}

/// Extracts the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn challenge(mut response: Response, realm: &str, error: Option<&str>) -> Response {
    let mut value = format!("Bearer realm=\"{realm}\"");
    if let Some(error) = error {
        value.push_str(&format!(", error=\"{error}\""));
    }
    if let Ok(value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(WWW_AUTHENTICATE, value);
    }
    response
}

fn record_resolution(outcome: &'static str) {
    metrics::counter!("janus_token_resolutions_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterExt;
    use crate::stages::resolution::resolver_fn;
    use chrono::Duration as ChronoDuration;
    use http::StatusCode;
    use janus_cache::ManualScheduler;
    use janus_core::{fixtures, handler_fn, Handler, ResponseExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn token(scopes: &[&str]) -> TokenInfo {
        TokenInfo {
            active: true,
            scopes: scopes.iter().map(ToString::to_string).collect(),
            subject: Some("alice".to_string()),
            client_id: Some("web".to_string()),
            expires_at: Some(Utc::now() + ChronoDuration::minutes(10)),
        }
    }

    fn directory(calls: &Arc<AtomicUsize>) -> TokenResolver {
        let calls = Arc::clone(calls);
        CachedResolver::new(
            resolver_fn(move |_ctx: &Context, raw: &String| {
                calls.fetch_add(1, Ordering::SeqCst);
                let outcome = match raw.as_str() {
                    "good" => Ok(token(&["read", "write"])),
                    "readonly" => Ok(token(&["read"])),
                    "stale" => Ok(TokenInfo {
                        expires_at: Some(Utc::now() - ChronoDuration::seconds(5)),
                        ..token(&["read"])
                    }),
                    "garbage" => Err(ResolutionError::Malformed("not json".to_string())),
                    "timeout" => Err(ResolutionError::Unavailable("connect timeout".to_string())),
                    _ => Ok(TokenInfo::inactive()),
                };
                Promise::from_result(outcome)
            }),
            Arc::new(ManualScheduler::new()),
        )
    }

    fn protected(resolver: TokenResolver) -> impl Handler {
        BearerTokenFilter::new(resolver)
            .required_scopes(["read"])
            .realm("orders")
            .and_then(handler_fn(|ctx: Context, _req| async move {
                let subject = ctx
                    .get::<TokenInfo>()
                    .and_then(|info| info.subject.clone())
                    .unwrap_or_default();
                let mut response = Response::with_status(StatusCode::OK);
                response
                    .headers_mut()
                    .insert("x-subject", HeaderValue::from_str(&subject).unwrap());
                response
            }))
    }

    async fn call(handler: &impl Handler, authorization: Option<&'static str>) -> Response {
        let request = match authorization {
            Some(value) => fixtures::get_with_header("/orders", "authorization", value),
            None => fixtures::get("/orders"),
        };
        handler.handle(Context::root(), request).value().await
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_token_expiry() {
        assert_eq!(
            TokenInfo::inactive().expiry(),
            Expiry::At(DateTime::<Utc>::MIN_UTC)
        );
        let forever = TokenInfo {
            expires_at: None,
            ..token(&[])
        };
        assert_eq!(forever.expiry(), Expiry::Never);
        assert!(forever.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_missing_scopes() {
        let info = token(&["read", "profile"]);
        let required = vec!["read".to_string(), "write".to_string()];
        assert_eq!(info.missing_scopes(&required), vec!["write"]);
        assert!(info.missing_scopes(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_is_challenged() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = protected(directory(&calls));

        let response = call(&handler, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer realm=\"orders\"");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler_and_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = protected(directory(&calls));

        for _ in 0..3 {
            let response = call(&handler, Some("Bearer good")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-subject"], "alice");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inactive_and_expired_tokens_are_rejected_uncached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = protected(directory(&calls));

        for authorization in ["Bearer unknown", "Bearer unknown", "Bearer stale"] {
            let response = call(&handler, Some(authorization)).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.headers()[WWW_AUTHENTICATE],
                "Bearer realm=\"orders\", error=\"invalid_token\""
            );
            let body = fixtures::body_string(response).await;
            assert!(body.contains("invalid_token"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_insufficient_scope_is_forbidden() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = BearerTokenFilter::new(directory(&calls))
            .required_scopes(["read", "write"])
            .and_then(fixtures::echo_handler());

        let readonly =
            handler.handle(Context::root(), fixtures::get_with_header("/", "authorization", "Bearer readonly"));
        let response = readonly.value().await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(fixtures::body_string(response).await.contains("insufficient_scope"));

        let good = handler.handle(Context::root(), fixtures::get_with_header("/", "authorization", "Bearer good"));
        assert_eq!(good.value().await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_resolver_failures_are_bad_gateway() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = protected(directory(&calls));

        for authorization in ["Bearer garbage", "Bearer timeout", "Bearer timeout"] {
            let response = call(&handler, Some(authorization)).await;
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_resolver_is_internal_error() {
        let resolver = CachedResolver::new(
            resolver_fn(|_ctx: &Context, _token: &String| {
                Promise::<TokenInfo, ResolutionError>::from_future(async {
                    let exploded = true;
                    if exploded {
                        panic!("introspection client bug");
                    }
                    Ok(TokenInfo::inactive())
                })
            }),
            Arc::new(ManualScheduler::new()),
        );
        let handler = protected(resolver);

        let response = call(&handler, Some("Bearer good")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
