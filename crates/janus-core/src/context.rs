//! Per-request context.
//!
//! A [`Context`] is an immutable, persistent chain of typed values that
//! travels with a request through the filter chain. Filters never mutate the
//! context they receive; they derive a child with [`Context::with_value`] and
//! pass that downstream. Lookup walks from the newest value towards the root,
//! so the nearest value of a given type wins.
//!
//! Cloning a context is cheap: parents are shared, never copied.

use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log correlation sortable.
///
/// # Example
///
/// ```
/// use janus_core::RequestId;
///
/// let id = RequestId::new();
/// let parsed: RequestId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

struct Root {
    request_id: RequestId,
    started_at: Instant,
}

struct Frame {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
    parent: Option<Arc<Frame>>,
}

/// Persistent chain of typed values attached to one request.
///
/// # Example
///
/// ```
/// use janus_core::Context;
///
/// #[derive(Debug, PartialEq)]
/// struct Principal(&'static str);
///
/// let root = Context::root();
/// let child = root.with_value(Principal("alice"));
///
/// assert_eq!(child.get::<Principal>(), Some(&Principal("alice")));
/// assert!(root.get::<Principal>().is_none());
/// assert_eq!(child.request_id(), root.request_id());
/// ```
#[derive(Clone)]
pub struct Context {
    root: Arc<Root>,
    top: Option<Arc<Frame>>,
}

impl Context {
    /// Creates a root context with a freshly generated request ID.
    #[must_use]
    pub fn root() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a root context for an already known request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            root: Arc::new(Root {
                request_id,
                started_at: Instant::now(),
            }),
            top: None,
        }
    }

    /// Returns a child context that carries `value` on top of this one.
    #[must_use]
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            root: Arc::clone(&self.root),
            top: Some(Arc::new(Frame {
                value: Box::new(value),
                type_name: type_name::<T>(),
                parent: self.top.clone(),
            })),
        }
    }

    /// Returns the nearest value of type `T`, if any.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.frames().find_map(|frame| frame.value.downcast_ref::<T>())
    }

    /// Returns `true` if a value of type `T` is present anywhere in the chain.
    pub fn contains<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.get::<T>().is_some()
    }

    /// Returns the number of values layered on top of the root.
    pub fn depth(&self) -> usize {
        self.frames().count()
    }

    /// Returns the request ID carried by the root of this chain.
    pub fn request_id(&self) -> RequestId {
        self.root.request_id
    }

    /// Returns the time elapsed since the root context was created.
    pub fn elapsed(&self) -> Duration {
        self.root.started_at.elapsed()
    }

    /// Type names of the layered values, newest first.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.frames().map(|frame| frame.type_name).collect()
    }

    fn frames(&self) -> Frames<'_> {
        Frames {
            next: self.top.as_deref(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.root.request_id)
            .field("values", &self.type_names())
            .finish()
    }
}

struct Frames<'a> {
    next: Option<&'a Frame>,
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next?;
        self.next = frame.parent.as_deref();
        Some(frame)
    }
}
