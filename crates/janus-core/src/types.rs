//! HTTP request and response types shared by handlers and filters.

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type flowing through the gateway.
///
/// A standard `http::Request` with a fully buffered body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type flowing through the gateway.
pub type Response = http::Response<Full<Bytes>>;

/// Extension trait for building simple responses.
pub trait ResponseExt {
    /// Creates an empty response with the given status.
    fn with_status(status: http::StatusCode) -> Response;

    /// Creates a plain-text error response with the given status code and message.
    fn error(status: http::StatusCode, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn with_status(status: http::StatusCode) -> Response {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn error(status: http::StatusCode, message: &str) -> Response {
        let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_error_response() {
        let response = Response::error(StatusCode::BAD_REQUEST, "Invalid input");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_with_status() {
        assert_eq!(
            Response::with_status(StatusCode::NO_CONTENT).status(),
            StatusCode::NO_CONTENT
        );
    }
}
