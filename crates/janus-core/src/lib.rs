//! # Janus Core
//!
//! Core types and traits for the Janus gateway.
//!
//! This crate provides the foundational pieces every other Janus crate builds on:
//!
//! - [`Promise`] - Single-assignment completion primitive with chained continuations
//! - [`Context`] - Persistent, per-request chain of typed values
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Handler`] - Asynchronous request processor contract
//! - [`Ttl`] - Time-to-live value (zero, finite or unlimited)
//! - [`GatewayError`] - Standard error type with HTTP status mapping
//!
//! ## Example
//!
//! ```
//! use janus_core::{handler_fn, Context, Handler, Request, Response};
//! use bytes::Bytes;
//! use http_body_util::Full;
//!
//! # tokio_test::block_on(async {
//! let handler = handler_fn(|_ctx, _req| async {
//!     Response::new(Full::new(Bytes::from_static(b"hello")))
//! });
//!
//! let request = Request::new(Full::new(Bytes::new()));
//! let response = handler.handle(Context::root(), request).value().await;
//! assert_eq!(response.status(), http::StatusCode::OK);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/janus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod fixtures;
mod handler;
pub mod promise;
mod ttl;
mod types;

pub use context::{Context, RequestId};
pub use error::{ErrorCategory, ErrorEnvelope, ErrorDetail, GatewayError};
pub use handler::{handler_fn, FnHandler, Handler, ResponsePromise, SharedHandler, StaticResponseHandler};
pub use promise::{Completer, Promise, SharedPromise};
pub use ttl::{ParseTtlError, Ttl};
pub use types::{Request, Response, ResponseExt};
