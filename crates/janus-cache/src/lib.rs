//! # Janus Cache
//!
//! Single-flight TTL cache for the Janus gateway.
//!
//! [`Cache`] maps keys to values produced by asynchronous factories:
//!
//! - **Single flight**: concurrent lookups of the same key share one
//!   computation; the factory runs once per entry lifetime.
//! - **Failures are not cached**: a failed (or panicked) computation is
//!   reported to every waiter and the key is evicted, so the next lookup
//!   retries.
//! - **Per-value TTL**: once a value settles, a timeout function derives its
//!   [`Ttl`](janus_core::Ttl), capped by an optional maximum. Zero evicts
//!   immediately, a finite TTL schedules an eviction through the
//!   [`Scheduler`], an unlimited TTL keeps the value until it is evicted
//!   explicitly.
//! - **Generation safety**: an eviction scheduled for an old entry never
//!   removes a newer entry stored under the same key.
//!
//! ## Example
//!
//! ```rust
//! use janus_cache::{Cache, TokioScheduler};
//! use janus_core::Ttl;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: Cache<String, u64, std::io::Error> = Cache::new(Arc::new(TokioScheduler::current()));
//! cache.set_default_timeout(Ttl::from_secs(30));
//!
//! let value = cache
//!     .get_value("answer".to_string(), || async { Ok(42) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, 42);
//! assert_eq!(cache.size(), 1);
//! # }
//! ```
//!
//! A lookup waits for the computation it joins. A factory that never settles
//! keeps its waiters pending; wrap lookups in `tokio::time::timeout` where
//! that matters.

#![doc(html_root_url = "https://docs.rs/janus-cache/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cache;
mod error;
mod scheduler;

pub use cache::{Cache, TimeoutFn, DEFAULT_TIMEOUT};
pub use error::CacheError;
pub use scheduler::{ManualScheduler, ScheduledTask, Scheduler, Task, TokioScheduler};
