//! Configuration sections.
//!
//! Every section rejects unknown keys so that a misspelt setting fails
//! loudly instead of silently falling back to a default.

use janus_core::Ttl;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Single-flight cache settings shared by every cache the gateway builds.
///
/// ```toml
/// [cache]
/// default_timeout = "60s"
/// max_timeout = "10m"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL applied when a value does not carry its own.
    pub default_timeout: Ttl,

    /// Upper bound on any computed TTL. Unset or `unlimited` means no cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timeout: Option<Ttl>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_timeout: Ttl::from_secs(60),
            max_timeout: None,
        }
    }
}

impl CacheConfig {
    /// The cap in the form caches accept it.
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_timeout.and_then(|ttl| ttl.as_duration())
    }
}

/// OAuth 2.0 token introspection (RFC 7662) used by the bearer token filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntrospectionConfig {
    /// Whether requests must carry an active bearer token.
    pub enabled: bool,

    /// Introspection endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Client ID presented to the endpoint.
    pub client_id: String,

    /// Client secret presented to the endpoint.
    pub client_secret: String,

    /// Scopes every token must grant.
    pub required_scopes: Vec<String>,

    /// Realm advertised in `WWW-Authenticate` challenges.
    pub realm: String,

    /// Cap on how long a token stays cached, on top of `[cache] max_timeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_max_timeout: Option<Ttl>,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            client_id: String::new(),
            client_secret: String::new(),
            required_scopes: Vec::new(),
            realm: "janus".to_string(),
            cache_max_timeout: None,
        }
    }
}

/// Request timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimerConfig {
    /// Whether the whole chain is timed.
    pub enabled: bool,

    /// Name reported with each measurement.
    pub name: String,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "gateway".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_timeout, Ttl::from_secs(60));
        assert_eq!(config.max_duration(), None);
    }

    #[test]
    fn test_unlimited_max_is_no_cap() {
        let config: CacheConfig = toml::from_str(r#"max_timeout = "unlimited""#).unwrap();
        assert_eq!(config.max_timeout, Some(Ttl::Unlimited));
        assert_eq!(config.max_duration(), None);

        let config: CacheConfig = toml::from_str(r#"max_timeout = "5m""#).unwrap();
        assert_eq!(config.max_duration(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_ttl_accepts_integer_seconds() {
        let config: CacheConfig = toml::from_str("default_timeout = 15").unwrap();
        assert_eq!(config.default_timeout, Ttl::from_secs(15));
    }

    #[test]
    fn test_introspection_partial() {
        let config: IntrospectionConfig = serde_json::from_str(
            r#"{"enabled": true, "endpoint": "https://idp.local/introspect", "required_scopes": ["read"]}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.realm, "janus");
        assert_eq!(config.required_scopes, vec!["read".to_string()]);
        assert!(config.cache_max_timeout.is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(toml::from_str::<TimerConfig>("enabled = true\nlabel = \"x\"").is_err());
        assert!(toml::from_str::<CacheConfig>("ttl = 5").is_err());
    }
}
