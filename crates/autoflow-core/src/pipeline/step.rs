//! Step descriptors and the transform trait.
//!
//! A step is a named async transform from one context value to the next.
//! `StepTransform` is the seam step implementations plug into. Because it
//! uses return-position `impl Future`, it is not object-safe; the same
//! blanket-impl pattern used for other async seams applies:
//! 1. `StepTransformDyn` is the object-safe variant with boxed futures
//! 2. every `StepTransform` implements `StepTransformDyn`
//! 3. `BoxStepTransform` wraps `Box<dyn StepTransformDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use autoflow_types::pipeline::StepErrorKind;

use crate::resilience::error::{RateLimitRejection, ResilienceError};

use super::retry::{RetryPolicy, WithRetry};

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Why a step failed to produce a new context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Business or validation failure raised by the step itself.
    #[error("{0}")]
    Failed(String),

    #[error("circuit open for dependency '{dependency}'")]
    CircuitOpen { dependency: String },

    #[error("rate limited for dependency '{dependency}': {reason}")]
    RateLimited {
        dependency: String,
        reason: RateLimitRejection,
    },

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// An external dependency was reached and failed.
    #[error("{message}")]
    Dependency { dependency: String, message: String },
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }

    pub fn kind(&self) -> StepErrorKind {
        match self {
            StepError::Failed(_) => StepErrorKind::Failed,
            StepError::CircuitOpen { .. } => StepErrorKind::CircuitOpen,
            StepError::RateLimited { .. } => StepErrorKind::RateLimited,
            StepError::Timeout { .. } => StepErrorKind::Timeout,
            StepError::Dependency { .. } => StepErrorKind::Dependency,
        }
    }

    /// Whether re-running the step with the same input may succeed.
    ///
    /// An open circuit is not transient from the step's point of view: it
    /// stays open for the whole cooldown.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StepError::RateLimited { .. } | StepError::Timeout { .. } | StepError::Dependency { .. }
        )
    }
}

impl<E: std::fmt::Display> From<ResilienceError<E>> for StepError {
    fn from(err: ResilienceError<E>) -> Self {
        match err {
            ResilienceError::CircuitOpen { dependency } => StepError::CircuitOpen { dependency },
            ResilienceError::RateLimited { dependency, reason } => {
                StepError::RateLimited { dependency, reason }
            }
            ResilienceError::Timeout { timeout_ms, .. } => StepError::Timeout { timeout_ms },
            ResilienceError::Operation { dependency, error } => StepError::Dependency {
                dependency,
                message: error.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// StepTransform
// ---------------------------------------------------------------------------

/// An async transform from one pipeline context to the next.
pub trait StepTransform<C>: Send + Sync {
    fn apply(&self, context: C) -> impl Future<Output = Result<C, StepError>> + Send;
}

/// Object-safe version of [`StepTransform`] with boxed futures.
pub trait StepTransformDyn<C>: Send + Sync {
    fn apply_boxed<'a>(
        &'a self,
        context: C,
    ) -> Pin<Box<dyn Future<Output = Result<C, StepError>> + Send + 'a>>;
}

impl<C: Send + 'static, T: StepTransform<C>> StepTransformDyn<C> for T {
    fn apply_boxed<'a>(
        &'a self,
        context: C,
    ) -> Pin<Box<dyn Future<Output = Result<C, StepError>> + Send + 'a>> {
        Box::pin(self.apply(context))
    }
}

/// Type-erased step transform.
pub struct BoxStepTransform<C> {
    inner: Box<dyn StepTransformDyn<C>>,
}

impl<C: Send + 'static> BoxStepTransform<C> {
    pub fn new<T: StepTransform<C> + 'static>(transform: T) -> Self {
        Self {
            inner: Box::new(transform),
        }
    }
}

impl<C: Send + 'static> StepTransform<C> for BoxStepTransform<C> {
    fn apply(&self, context: C) -> impl Future<Output = Result<C, StepError>> + Send {
        self.inner.apply_boxed(context)
    }
}

/// Adapts an async closure into a transform.
struct FnTransform<F>(F);

impl<C, F, Fut> StepTransform<C> for FnTransform<F>
where
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C, StepError>> + Send,
{
    fn apply(&self, context: C) -> impl Future<Output = Result<C, StepError>> + Send {
        (self.0)(context)
    }
}

/// Fails the wrapped transform with `StepError::Timeout` once the deadline elapses.
struct WithTimeout<C> {
    inner: BoxStepTransform<C>,
    timeout: Duration,
}

impl<C: Send + 'static> StepTransform<C> for WithTimeout<C> {
    async fn apply(&self, context: C) -> Result<C, StepError> {
        match tokio::time::timeout(self.timeout, self.inner.apply(context)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(StepError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A named unit of work in a pipeline.
pub struct Step<C> {
    name: String,
    transform: BoxStepTransform<C>,
}

impl<C: Send + 'static> Step<C> {
    pub fn new<T: StepTransform<C> + 'static>(name: impl Into<String>, transform: T) -> Self {
        Self {
            name: name.into(),
            transform: BoxStepTransform::new(transform),
        }
    }

    /// Build a step from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, StepError>> + Send + 'static,
    {
        Self::new(name, FnTransform(transform))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the step's transform to `context`.
    pub async fn run(&self, context: C) -> Result<C, StepError> {
        self.transform.apply(context).await
    }

    /// Bound each invocation of this step by `timeout`.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            name: self.name,
            transform: BoxStepTransform::new(WithTimeout {
                inner: self.transform,
                timeout,
            }),
        }
    }
}

impl<C: Clone + Send + 'static> Step<C> {
    /// Re-run this step on transient failures according to `policy`.
    ///
    /// Every attempt receives the same input context.
    pub fn with_retry(self, policy: RetryPolicy) -> Self {
        let transform = WithRetry::new(self.name.clone(), self.transform, policy);
        Self {
            name: self.name,
            transform: BoxStepTransform::new(transform),
        }
    }
}

impl<C> std::fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}
