//! Ordered filter chains.
//!
//! A [`Chain`] composes filters `F1, …, Fn` in front of a handler `H` into a
//! single handler `F1 ∘ … ∘ Fn ∘ H`: `F1` sees the request first and the
//! response last. Each invocation walks the chain with a cursor, so a chain
//! can be shared and invoked concurrently.
//!
//! ## Example
//!
//! ```
//! use janus_core::{fixtures, Context, Handler};
//! use janus_middleware::{filter_fn, Chain};
//!
//! # tokio_test::block_on(async {
//! let chain = Chain::builder()
//!     .filter(filter_fn("outer", |ctx, req, next| async move { next.handle(ctx, req).value().await }))
//!     .filter(filter_fn("inner", |ctx, req, next| async move { next.handle(ctx, req).value().await }))
//!     .handler(fixtures::echo_handler());
//!
//! assert_eq!(chain.stage_names(), vec!["outer", "inner"]);
//! let response = chain.handle(Context::root(), fixtures::get("/")).value().await;
//! assert_eq!(response.status(), http::StatusCode::OK);
//! # });
//! ```

use crate::filter::{BoxedFilter, Filter, Next};
use janus_core::{Context, Handler, Request, ResponsePromise, SharedHandler};
use std::fmt;
use std::sync::Arc;

/// Filters in front of a handler, usable as a handler.
#[derive(Clone)]
pub struct Chain {
    inner: Arc<ChainInner>,
}

struct ChainInner {
    filters: Vec<BoxedFilter>,
    handler: SharedHandler,
}

impl Chain {
    /// Creates a new chain builder.
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Creates a chain from filters in invocation order and a terminal handler.
    pub fn new(filters: Vec<BoxedFilter>, handler: SharedHandler) -> Self {
        Self {
            inner: Arc::new(ChainInner { filters, handler }),
        }
    }

    /// Returns the names of the filters in invocation order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.inner.filters.iter().map(|f| f.name()).collect()
    }

    /// Returns the number of filters.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.inner.filters.len()
    }
}

impl Handler for Chain {
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        Cursor {
            chain: Arc::clone(&self.inner),
            position: 0,
        }
        .handle(ctx, request)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("filters", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Position within one invocation of a chain.
struct Cursor {
    chain: Arc<ChainInner>,
    position: usize,
}

impl Handler for Cursor {
    fn handle(&self, ctx: Context, request: Request) -> ResponsePromise {
        match self.chain.filters.get(self.position) {
            Some(filter) => {
                let next = Next::new(Arc::new(Cursor {
                    chain: Arc::clone(&self.chain),
                    position: self.position + 1,
                }));
                filter.filter(ctx, request, next)
            }
            None => self.chain.handler.handle(ctx, request),
        }
    }
}

/// Builder for constructing a [`Chain`].
#[derive(Default)]
pub struct ChainBuilder {
    filters: Vec<BoxedFilter>,
}

impl ChainBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter; filters run in the order they are added.
    #[must_use]
    pub fn filter<F: Filter>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Appends an already shared filter.
    #[must_use]
    pub fn boxed_filter(mut self, filter: BoxedFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Appends a filter only if `filter` is `Some`.
    #[must_use]
    pub fn optional_filter<F: Filter>(self, filter: Option<F>) -> Self {
        match filter {
            Some(filter) => self.filter(filter),
            None => self,
        }
    }

    /// Number of filters added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filter was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Terminates the chain with `handler`.
    pub fn handler<H: Handler>(self, handler: H) -> Chain {
        self.shared_handler(Arc::new(handler))
    }

    /// Terminates the chain with an already shared handler.
    pub fn shared_handler(self, handler: SharedHandler) -> Chain {
        Chain::new(self.filters, handler)
    }
}
