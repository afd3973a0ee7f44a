//! Retry wrapper for transient step failures.
//!
//! The engine never retries on its own. A step opts in with
//! [`Step::with_retry`](super::step::Step::with_retry); the engine still
//! records a single result for the step, reflecting the last attempt.

use std::time::Duration;

use autoflow_types::config::RetrySettings;

use super::step::{BoxStepTransform, StepError, StepTransform};

/// How often and how patiently to re-run a failing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Whether another attempt should follow a failed one.
    ///
    /// `attempt` is 1-based (the first execution is attempt 1). Only
    /// transient errors are retried.
    pub fn should_retry(&self, attempt: u32, error: &StepError) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, Duration::from_millis(settings.backoff_ms))
    }
}

/// Re-invokes the wrapped transform with a clone of the same input.
pub(crate) struct WithRetry<C> {
    step_name: String,
    inner: BoxStepTransform<C>,
    policy: RetryPolicy,
}

impl<C> WithRetry<C> {
    pub(crate) fn new(step_name: String, inner: BoxStepTransform<C>, policy: RetryPolicy) -> Self {
        Self {
            step_name,
            inner,
            policy,
        }
    }
}

impl<C: Clone + Send + 'static> StepTransform<C> for WithRetry<C> {
    async fn apply(&self, context: C) -> Result<C, StepError> {
        let mut attempt = 1;
        loop {
            match self.inner.apply(context.clone()).await {
                Ok(next) => return Ok(next),
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    tracing::warn!(
                        step = %self.step_name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        kind = %err.kind(),
                        error = %err,
                        "transient step failure, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
