//! Single-assignment completion primitive.
//!
//! A [`Promise`] represents a value of type `T` or a failure of type `E` that
//! may not be available yet. Continuations are attached with the `then_*`
//! combinators; each consumes the promise and returns a new one, so a chain of
//! continuations runs in the order it was written.
//!
//! A promise settles at most once. A [`Completer`] obtained from
//! [`Promise::deferred`] is consumed when it completes, which makes double
//! completion unrepresentable.
//!
//! Promises are lazy Rust futures: continuations run on the task that drives
//! the chain, and a promise created from an already settled result runs its
//! continuations as soon as it is polled. Use [`Promise::spawn`] to start work
//! eagerly on the Tokio runtime, and [`Promise::shared`] when several
//! subscribers must observe the same outcome.
//!
//! # Example
//!
//! ```
//! use janus_core::Promise;
//!
//! # tokio_test::block_on(async {
//! let (completer, promise) = Promise::<u32, String>::deferred();
//! let doubled = promise.then(|value| value * 2);
//!
//! completer.resolve(21);
//! assert_eq!(doubled.await, Ok(42));
//! # });
//! ```

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::oneshot;
use tracing::warn;

/// A value or failure that becomes available at some point.
///
/// `Promise` implements [`Future`] with `Output = Result<T, E>`, so it can be
/// awaited directly.
#[must_use = "promises do nothing unless awaited"]
pub struct Promise<T, E> {
    inner: BoxFuture<'static, Result<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates a promise that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    /// Creates a promise that is already rejected with `error`.
    pub fn rejected(error: E) -> Self {
        Self::from_result(Err(error))
    }

    /// Creates a promise from an already known outcome.
    pub fn from_result(result: Result<T, E>) -> Self {
        Self {
            inner: futures_util::future::ready(result).boxed(),
        }
    }

    /// Wraps a future producing the outcome.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }

    /// Creates a pending promise together with the [`Completer`] that settles it.
    ///
    /// If the completer is dropped without completing, the promise never
    /// settles; a warning is logged when that is detected.
    pub fn deferred() -> (Completer<T, E>, Self) {
        let (sender, receiver) = oneshot::channel();
        let promise = Self::from_future(async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => {
                    warn!("completer dropped without completing, promise stays pending");
                    std::future::pending().await
                }
            }
        });
        (Completer { sender }, promise)
    }

    /// Starts `future` on the Tokio runtime immediately and returns a promise
    /// of its outcome.
    ///
    /// A panic inside the spawned work is resumed on the task awaiting the
    /// promise. Must be called from within a Tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        Self::from_future(async move {
            match handle.await {
                Ok(result) => result,
                Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
                Err(_) => {
                    warn!("spawned promise work was cancelled, promise stays pending");
                    std::future::pending().await
                }
            }
        })
    }

    /// Transforms the resolved value.
    pub fn then<U, F>(self, f: F) -> Promise<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Promise::from_future(self.inner.map(move |result| result.map(f)))
    }

    /// Continues with another asynchronous step once the value is available.
    ///
    /// A failure skips `f` and is carried through unchanged.
    pub fn then_async<U, F>(self, f: F) -> Promise<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U, E> + Send + 'static,
    {
        let inner = self.inner;
        Promise::from_future(async move {
            match inner.await {
                Ok(value) => f(value).await,
                Err(error) => Err(error),
            }
        })
    }

    /// Handles a failure, either recovering with a value or failing with a new error.
    pub fn then_catch<E2, F>(self, f: F) -> Promise<T, E2>
    where
        E2: Send + 'static,
        F: FnOnce(E) -> Result<T, E2> + Send + 'static,
    {
        Promise::from_future(self.inner.map(move |result| match result {
            Ok(value) => Ok(value),
            Err(error) => f(error),
        }))
    }

    /// Handles a failure with another asynchronous step.
    pub fn then_catch_async<E2, F>(self, f: F) -> Promise<T, E2>
    where
        E2: Send + 'static,
        F: FnOnce(E) -> Promise<T, E2> + Send + 'static,
    {
        let inner = self.inner;
        Promise::from_future(async move {
            match inner.await {
                Ok(value) => Ok(value),
                Err(error) => f(error).await,
            }
        })
    }

    /// Observes the resolved value without changing the outcome.
    pub fn then_on_result<F>(self, f: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        Self::from_future(self.inner.map(move |result| {
            if let Ok(value) = &result {
                f(value);
            }
            result
        }))
    }

    /// Observes the failure without changing the outcome.
    pub fn then_on_error<F>(self, f: F) -> Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        Self::from_future(self.inner.map(move |result| {
            if let Err(error) = &result {
                f(error);
            }
            result
        }))
    }

    /// Runs `f` once the promise settles, whatever the outcome.
    pub fn then_always<F>(self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_future(self.inner.map(move |result| {
            f();
            result
        }))
    }

    /// Transforms the failure.
    pub fn map_err<E2, F>(self, f: F) -> Promise<T, E2>
    where
        E2: Send + 'static,
        F: FnOnce(E) -> E2 + Send + 'static,
    {
        Promise::from_future(self.inner.map(move |result| result.map_err(f)))
    }

    /// Converts the promise into one that many subscribers can await.
    pub fn shared(self) -> SharedPromise<T, E>
    where
        T: Clone + Sync,
        E: Clone + Sync,
    {
        SharedPromise {
            inner: self.inner.shared(),
        }
    }
}

impl<T> Promise<T, Infallible>
where
    T: Send + 'static,
{
    /// Awaits a promise that cannot fail and returns its value.
    pub async fn value(self) -> T {
        match self.await {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<T, E> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T, E> From<Result<T, E>> for Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn from(result: Result<T, E>) -> Self {
        Self::from_result(result)
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

/// The write side of a deferred [`Promise`].
///
/// Every completion method consumes the completer, so a promise is settled at
/// most once.
pub struct Completer<T, E> {
    sender: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Completer<T, E> {
    /// Settles the promise with `result`.
    ///
    /// Returns `false` if the promise was dropped and nobody can observe the outcome.
    pub fn complete(self, result: Result<T, E>) -> bool {
        self.sender.send(result).is_ok()
    }

    /// Resolves the promise with `value`.
    pub fn resolve(self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Rejects the promise with `error`.
    pub fn reject(self, error: E) -> bool {
        self.complete(Err(error))
    }

    /// Returns `true` if the promise has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<T, E> fmt::Debug for Completer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// A promise that many subscribers can await.
///
/// Every clone observes the same outcome. A subscriber that arrives after the
/// promise settled gets the value immediately.
#[derive(Clone)]
#[must_use = "promises do nothing unless awaited"]
pub struct SharedPromise<T, E> {
    inner: Shared<BoxFuture<'static, Result<T, E>>>,
}

impl<T, E> SharedPromise<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Returns the outcome if the promise has already settled.
    pub fn peek(&self) -> Option<&Result<T, E>> {
        self.inner.peek()
    }

    /// Returns `true` once the promise has settled.
    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }

    /// Converts this subscription into a plain [`Promise`].
    pub fn into_promise(self) -> Promise<T, E> {
        Promise::from_future(self.inner)
    }
}

impl<T, E> Future for SharedPromise<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<T, E> fmt::Debug for SharedPromise<T, E>
where
    T: Clone,
    E: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPromise")
            .field("settled", &self.inner.peek().is_some())
            .finish()
    }
}
