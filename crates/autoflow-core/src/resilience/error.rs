//! Error kinds surfaced by protected calls.

use autoflow_types::pipeline::StepErrorKind;

/// Why the rate limiter refused to admit a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitRejection {
    /// The configured queue depth was already reached.
    #[error("queue full ({depth} callers waiting)")]
    QueueFull { depth: usize },

    /// The caller waited longer than the configured maximum.
    #[error("waited {waited_ms}ms without capacity")]
    WaitExceeded { waited_ms: u64 },
}

/// Errors returned by a call through the resilience layer.
///
/// `CircuitOpen` and `RateLimited` mean the wrapped operation was never
/// invoked. `Timeout` and `Operation` mean it ran and failed; both count
/// against the breaker.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    #[error("circuit open for dependency '{dependency}'")]
    CircuitOpen { dependency: String },

    #[error("rate limited for dependency '{dependency}': {reason}")]
    RateLimited {
        dependency: String,
        reason: RateLimitRejection,
    },

    #[error("call to dependency '{dependency}' timed out after {timeout_ms}ms")]
    Timeout { dependency: String, timeout_ms: u64 },

    #[error("{error}")]
    Operation { dependency: String, error: E },
}

impl<E> ResilienceError<E> {
    /// Name of the dependency the call was made against.
    pub fn dependency(&self) -> &str {
        match self {
            ResilienceError::CircuitOpen { dependency }
            | ResilienceError::RateLimited { dependency, .. }
            | ResilienceError::Timeout { dependency, .. }
            | ResilienceError::Operation { dependency, .. } => dependency,
        }
    }

    /// Classification recorded in step results.
    pub fn kind(&self) -> StepErrorKind {
        match self {
            ResilienceError::CircuitOpen { .. } => StepErrorKind::CircuitOpen,
            ResilienceError::RateLimited { .. } => StepErrorKind::RateLimited,
            ResilienceError::Timeout { .. } => StepErrorKind::Timeout,
            ResilienceError::Operation { .. } => StepErrorKind::Dependency,
        }
    }

    /// True when the wrapped operation was never invoked.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen { .. } | ResilienceError::RateLimited { .. }
        )
    }
}
