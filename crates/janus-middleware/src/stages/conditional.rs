//! Conditional filter.
//!
//! [`ConditionalFilter`] decorates another filter and applies it only when a
//! [`Condition`] holds for the request. The condition is evaluated
//! asynchronously; its outcome is turned into a [`ConditionalState`] by a pure
//! mapping step:
//!
//! | Evaluation     | State        | Effect                              |
//! |----------------|--------------|-------------------------------------|
//! | `Ok(true)`     | `Delegating` | decorated filter handles the request |
//! | `Ok(false)`    | `Bypassing`  | request goes straight to `next`     |
//! | `Err(_)`       | `Bypassing`  | failure is logged, never propagated |
//!
//! Whatever the outcome, `next` is invoked at most once.

use crate::filter::{BoxedFilter, Filter, Next};
use janus_core::{Context, Promise, Request, ResponsePromise};
use http::{HeaderName, HeaderValue};
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

/// Failure while evaluating a condition.
#[derive(Debug, Clone, Error)]
#[error("condition evaluation failed: {message}")]
pub struct EvaluationError {
    message: String,
}

impl EvaluationError {
    /// Create an evaluation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Predicate over a request, evaluated asynchronously.
pub trait Condition: Send + Sync + 'static {
    /// Evaluates the condition for `request` within `ctx`.
    fn evaluate(&self, ctx: &Context, request: &Request) -> Promise<bool, EvaluationError>;
}

impl Condition for bool {
    fn evaluate(&self, _ctx: &Context, _request: &Request) -> Promise<bool, EvaluationError> {
        Promise::resolved(*self)
    }
}

/// A synchronous condition backed by a closure.
///
/// Created with [`condition_fn`].
pub struct FnCondition<F> {
    func: F,
}

/// Creates a condition from a closure.
pub fn condition_fn<F>(func: F) -> FnCondition<F>
where
    F: Fn(&Context, &Request) -> Result<bool, EvaluationError> + Send + Sync + 'static,
{
    FnCondition { func }
}

impl<F> Condition for FnCondition<F>
where
    F: Fn(&Context, &Request) -> Result<bool, EvaluationError> + Send + Sync + 'static,
{
    fn evaluate(&self, ctx: &Context, request: &Request) -> Promise<bool, EvaluationError> {
        Promise::from_result((self.func)(ctx, request))
    }
}

/// Holds when a header is present, or present with an expected value.
#[derive(Debug, Clone)]
pub struct HeaderCondition {
    name: HeaderName,
    expected: Option<HeaderValue>,
}

impl HeaderCondition {
    /// Holds when `name` is present.
    pub fn present(name: HeaderName) -> Self {
        Self {
            name,
            expected: None,
        }
    }

    /// Holds when `name` is present with exactly `value`.
    pub fn equals(name: HeaderName, value: HeaderValue) -> Self {
        Self {
            name,
            expected: Some(value),
        }
    }
}

impl Condition for HeaderCondition {
    fn evaluate(&self, _ctx: &Context, request: &Request) -> Promise<bool, EvaluationError> {
        let mut values = request.headers().get_all(&self.name).iter();
        let holds = match &self.expected {
            Some(expected) => values.any(|value| value == expected),
            None => values.next().is_some(),
        };
        Promise::resolved(holds)
    }
}

/// Lifecycle of one conditional invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalState {
    /// The condition is being evaluated.
    Evaluating,
    /// The decorated filter handles the request.
    Delegating,
    /// The request bypasses the decorated filter.
    Bypassing,
}

impl ConditionalState {
    /// Maps a finished evaluation to the state it leads to.
    pub fn from_evaluation(evaluation: &Result<bool, EvaluationError>) -> Self {
        match evaluation {
            Ok(true) => Self::Delegating,
            Ok(false) | Err(_) => Self::Bypassing,
        }
    }
}

/// Applies a decorated filter only when a condition holds.
///
/// # Example
///
/// ```
/// use janus_middleware::filter_fn;
/// use janus_middleware::stages::conditional::{ConditionalFilter, HeaderCondition};
///
/// let audit = filter_fn("audit", |ctx, req, next| async move { next.handle(ctx, req).value().await });
/// let filter = ConditionalFilter::new(
///     audit,
///     HeaderCondition::present(http::HeaderName::from_static("x-audit")),
/// );
/// ```
pub struct ConditionalFilter {
    delegate: BoxedFilter,
    condition: Arc<dyn Condition>,
}

impl ConditionalFilter {
    /// Wraps `delegate` so that it only runs when `condition` holds.
    pub fn new<F, C>(delegate: F, condition: C) -> Self
    where
        F: Filter,
        C: Condition,
    {
        Self {
            delegate: Arc::new(delegate),
            condition: Arc::new(condition),
        }
    }
}

impl Filter for ConditionalFilter {
    fn name(&self) -> &'static str {
        "conditional"
    }

    fn filter(&self, ctx: Context, request: Request, next: Next) -> ResponsePromise {
        trace!(delegate = self.delegate.name(), state = ?ConditionalState::Evaluating, "evaluating condition");
        let evaluation = self.condition.evaluate(&ctx, &request);
        let delegate = Arc::clone(&self.delegate);

        Promise::from_future(async move {
            let outcome = evaluation.await;
            let state = ConditionalState::from_evaluation(&outcome);
            match &outcome {
                Err(error) => {
                    warn!(delegate = delegate.name(), error = %error, "condition evaluation failed, bypassing filter");
                    record_evaluation("error");
                }
                Ok(true) => record_evaluation("true"),
                Ok(false) => record_evaluation("false"),
            }
            trace!(delegate = delegate.name(), state = ?state, "condition evaluated");

            match state {
                ConditionalState::Delegating => delegate.filter(ctx, request, next).await,
                ConditionalState::Evaluating | ConditionalState::Bypassing => {
                    next.handle(ctx, request).await
                }
            }
        })
    }
}

fn record_evaluation(result: &'static str) {
    metrics::counter!("janus_condition_evaluations_total", "result" => result).increment(1);
}
