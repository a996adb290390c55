//! Error types for cache lookups.

use std::sync::Arc;
use thiserror::Error;

/// Failure observed by a cache lookup.
///
/// Every waiter on the same computation receives a clone of the same error;
/// the factory error is shared behind an [`Arc`].
#[derive(Debug, Error)]
pub enum CacheError<E> {
    /// The factory completed with an error.
    #[error("cache value computation failed: {0}")]
    Compute(Arc<E>),

    /// The computation ended without producing an outcome (the factory panicked).
    #[error("cache value computation interrupted: {0}")]
    Interrupted(String),
}

impl<E> CacheError<E> {
    /// Create an interrupted error.
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted(reason.into())
    }

    /// Returns the factory error, if the factory failed.
    pub fn compute_error(&self) -> Option<&E> {
        match self {
            Self::Compute(error) => Some(error),
            Self::Interrupted(_) => None,
        }
    }

    /// Returns `true` if the computation was interrupted.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Compute(error) => Self::Compute(Arc::clone(error)),
            Self::Interrupted(reason) => Self::Interrupted(reason.clone()),
        }
    }
}
