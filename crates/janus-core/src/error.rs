//! Error types for Janus.
//!
//! [`GatewayError`] is the standard error type for failures that the gateway
//! turns into HTTP responses. Handlers and filters never fail outright: they
//! convert a `GatewayError` into a response with [`GatewayError::into_response`]
//! and return it like any other response.

use crate::types::Response;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categories of errors for classification and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or invalid credentials.
    Authentication,
    /// Credentials are valid but not sufficient.
    Authorization,
    /// Failure inside the gateway itself.
    Internal,
    /// An upstream or collaborating service failed.
    External,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Standard error type for Janus.
///
/// # Example
///
/// ```
/// use janus_core::{ErrorCategory, GatewayError};
///
/// let error = GatewayError::authentication("token expired");
/// assert_eq!(error.category(), ErrorCategory::Authentication);
/// assert_eq!(error.status_code(), http::StatusCode::UNAUTHORIZED);
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Machine-readable reason, e.g. `invalid_token`.
        reason: Option<String>,
    },

    /// Authorization denied.
    #[error("Authorization denied: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
        /// Machine-readable reason, e.g. `insufficient_scope`.
        reason: Option<String>,
    },

    /// Internal gateway error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// External service error.
    #[error("External service error: {message}")]
    External {
        /// Human-readable error message.
        message: String,
        /// The name of the external service.
        service: Option<String>,
    },
}

impl GatewayError {
    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            reason: None,
        }
    }

    /// Creates an authentication error with a machine-readable reason.
    #[must_use]
    pub fn authentication_with_reason(
        message: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Authentication {
            message: message.into(),
            reason: Some(reason.into()),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            reason: None,
        }
    }

    /// Creates an authorization error with a machine-readable reason.
    #[must_use]
    pub fn authorization_with_reason(
        message: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Authorization {
            message: message.into(),
            reason: Some(reason.into()),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external(message: impl Into<String>, service: Option<impl Into<String>>) -> Self {
        Self::External {
            message: message.into(),
            service: service.map(Into::into),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::External { .. } => ErrorCategory::External,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns the machine-readable error code.
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::Authentication {
                reason: Some(reason),
                ..
            }
            | Self::Authorization {
                reason: Some(reason),
                ..
            } => reason.as_str(),
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_DENIED",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::External { .. } => "EXTERNAL_SERVICE_ERROR",
        }
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        let message = match self {
            // Internal details stay in the logs.
            Self::Internal { .. } => "internal gateway error".to_string(),
            _ => self.to_string(),
        };
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
                category: self.category(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    /// Converts this error into a JSON error response.
    #[must_use]
    pub fn into_response(self, request_id: Option<&str>) -> Response {
        let envelope = self.to_envelope(request_id);
        let body = serde_json::to_vec(&envelope).unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
}
