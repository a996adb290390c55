//! # Janus Middleware
//!
//! Filter chain and standard filters for the Janus gateway.
//!
//! A [`Filter`] wraps a handler: it sees every request before the handler
//! does, may answer on its own, and otherwise hands the request to its
//! [`Next`]. A [`Chain`] composes filters right to left in front of a
//! terminal handler and is itself a handler:
//!
//! ```text
//! Request → F1 → F2 → ... → Fn → Handler
//!                                  ↓
//! Response ← F1 ← F2 ← ... ← Fn ←──┘
//! ```
//!
//! ## Standard filters
//!
//! | Filter                | Purpose                                      |
//! |-----------------------|----------------------------------------------|
//! | `ConditionalFilter`   | Apply a filter only when a condition holds   |
//! | `TimerFilter`         | Record total/internal/downstream time        |
//! | `BaseUriFilter`       | Rebase the request URI onto a backend        |
//! | `BearerTokenFilter`   | Require a valid, sufficiently scoped token   |
//!
//! ## Example
//!
//! ```
//! use janus_core::{fixtures, Context, Handler};
//! use janus_middleware::stages::{BaseUriFilter, TimerFilter};
//! use janus_middleware::Chain;
//!
//! # tokio_test::block_on(async {
//! let chain = Chain::builder()
//!     .filter(TimerFilter::new("backend", BaseUriFilter::new("http://orders:8080")))
//!     .handler(fixtures::echo_handler());
//!
//! let response = chain.handle(Context::root(), fixtures::get("/v1/orders")).value().await;
//! assert_eq!(
//!     response.headers()[fixtures::ECHO_URI_HEADER],
//!     "http://orders:8080/v1/orders"
//! );
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/janus-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod filter;
pub mod stages;

pub use chain::{Chain, ChainBuilder};
pub use filter::{filter_fn, BoxedFilter, Filter, FilterExt, Filtered, FnFilter, Next};
