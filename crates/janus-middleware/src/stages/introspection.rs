//! OAuth 2.0 token introspection (RFC 7662).
//!
//! [`IntrospectionResolver`] posts the token as a form to the introspection
//! endpoint, authenticating with HTTP basic client credentials, and maps the
//! JSON answer to a [`TokenInfo`].

use crate::stages::bearer::{ResolutionError, TokenInfo};
use crate::stages::resolution::Resolver;
use chrono::DateTime;
use janus_core::{Context, Promise};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Answer of an introspection endpoint.
#[derive(Debug, Deserialize)]
struct IntrospectionAnswer {
    active: bool,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Resolves bearer tokens against an RFC 7662 introspection endpoint.
#[derive(Debug, Clone)]
pub struct IntrospectionResolver {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
}

impl IntrospectionResolver {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a resolver for `endpoint` with the given client credentials.
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ResolutionError> {
        let client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ResolutionError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, endpoint, client_id, client_secret))
    }

    /// Creates a resolver that sends requests with `client`.
    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// The introspection endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Resolver<String, TokenInfo, ResolutionError> for IntrospectionResolver {
    fn resolve(&self, ctx: &Context, token: &String) -> Promise<TokenInfo, ResolutionError> {
        let request = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("x-request-id", ctx.request_id().to_string())
            .form(&[("token", token.as_str()), ("token_type_hint", "access_token")]);
        let endpoint = self.endpoint.clone();

        Promise::from_future(async move {
            debug!(endpoint = %endpoint, "introspecting token");
            let response = request
                .send()
                .await
                .map_err(|e| ResolutionError::Unavailable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ResolutionError::Unavailable(format!(
                    "introspection endpoint answered {status}"
                )));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| ResolutionError::Unavailable(e.to_string()))?;
            parse_introspection(&body)
        })
    }
}

/// Maps an introspection answer to a [`TokenInfo`].
///
/// Only `active` is required. Inactive answers carry no other information.
pub fn parse_introspection(body: &[u8]) -> Result<TokenInfo, ResolutionError> {
    let answer: IntrospectionAnswer =
        serde_json::from_slice(body).map_err(|e| ResolutionError::Malformed(e.to_string()))?;
    if !answer.active {
        return Ok(TokenInfo::inactive());
    }

    let expires_at = answer
        .exp
        .map(|exp| {
            DateTime::from_timestamp(exp, 0)
                .ok_or_else(|| ResolutionError::Malformed(format!("exp out of range: {exp}")))
        })
        .transpose()?;

    Ok(TokenInfo {
        active: true,
        scopes: answer
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(ToString::to_string)
            .collect(),
        subject: answer.sub,
        client_id: answer.client_id,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_active_answer() {
        let body = br#"{
            "active": true,
            "scope": "orders:read  orders:write",
            "sub": "alice",
            "client_id": "web",
            "exp": 1893456000,
            "token_type": "Bearer"
        }"#;

        let info = parse_introspection(body).unwrap();
        assert!(info.active);
        assert_eq!(info.scopes, vec!["orders:read", "orders:write"]);
        assert_eq!(info.subject.as_deref(), Some("alice"));
        assert_eq!(info.client_id.as_deref(), Some("web"));
        assert_eq!(info.expires_at.unwrap().timestamp(), 1_893_456_000);
    }

    #[test]
    fn test_parse_minimal_and_inactive_answers() {
        let minimal = parse_introspection(br#"{"active": true}"#).unwrap();
        assert!(minimal.scopes.is_empty());
        assert!(minimal.expires_at.is_none());

        let inactive = parse_introspection(br#"{"active": false, "sub": "ignored"}"#).unwrap();
        assert_eq!(inactive, TokenInfo::inactive());
    }

    #[test]
    fn test_parse_malformed_answers() {
        for body in [
            &b"<html>oops</html>"[..],
            br#"{"scope": "read"}"#,
            br#"{"active": "yes"}"#,
            br#"{"active": true, "exp": 99999999999999999}"#,
        ] {
            assert!(matches!(
                parse_introspection(body),
                Err(ResolutionError::Malformed(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let resolver =
            IntrospectionResolver::new("http://127.0.0.1:9/introspect", "gateway", "secret").unwrap();
        assert_eq!(resolver.endpoint(), "http://127.0.0.1:9/introspect");

        let outcome = resolver
            .resolve(&Context::root(), &"opaque".to_string())
            .await;
        assert!(matches!(outcome, Err(ResolutionError::Unavailable(_))));
    }
}
