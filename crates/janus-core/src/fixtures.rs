//! Test fixtures for Janus development and testing.
//!
//! Small builders for requests and handlers used by tests across the
//! workspace.
//!
//! # Example
//!
//! ```
//! use janus_core::fixtures;
//!
//! let request = fixtures::get_with_header("/orders?page=2", "x-test", "1");
//! assert_eq!(request.uri().query(), Some("page=2"));
//! assert_eq!(request.headers()["x-test"], "1");
//! ```

use crate::context::Context;
use crate::handler::{handler_fn, Handler};
use crate::types::{Request, Response};
use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};

/// Header set by [`echo_handler`] to the URI it received.
pub const ECHO_URI_HEADER: &str = "x-echo-uri";

/// Header set by [`echo_handler`] to the request ID of the context it received.
pub const ECHO_REQUEST_ID_HEADER: &str = "x-echo-request-id";

/// Creates a request with the given method and URI and an empty body.
///
/// # Panics
///
/// Panics if `uri` is not a valid URI.
#[must_use]
pub fn request(method: Method, uri: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .expect("fixture request must be valid")
}

/// Creates a GET request for `uri`.
#[must_use]
pub fn get(uri: &str) -> Request {
    request(Method::GET, uri)
}

/// Creates a GET request for `uri` carrying one header.
#[must_use]
pub fn get_with_header(uri: &str, name: &'static str, value: &'static str) -> Request {
    let mut request = get(uri);
    request
        .headers_mut()
        .insert(name, HeaderValue::from_static(value));
    request
}

/// A handler answering `200 OK` that echoes request details in headers.
///
/// The received URI is echoed in [`ECHO_URI_HEADER`], the context request ID
/// in [`ECHO_REQUEST_ID_HEADER`], and every request header starting with
/// `x-` is copied onto the response.
pub fn echo_handler() -> impl Handler {
    handler_fn(|ctx: Context, request: Request| async move {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        for (name, value) in request.headers() {
            if name.as_str().starts_with("x-") {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Ok(uri) = HeaderValue::from_str(&request.uri().to_string()) {
            headers.insert(ECHO_URI_HEADER, uri);
        }
        if let Ok(id) = HeaderValue::from_str(&ctx.request_id().to_string()) {
            headers.insert(ECHO_REQUEST_ID_HEADER, id);
        }
        response
    })
}

/// Collects a response body into a string.
///
/// # Panics
///
/// Panics if the body is not valid UTF-8.
pub async fn body_string(response: Response) -> String {
    let bytes = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };
    String::from_utf8(bytes.to_vec()).expect("response body must be UTF-8")
}
