use thiserror::Error;

/// Errors raised when a loaded configuration is semantically invalid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("dependency '{dependency}': rate limit must allow at least one call")]
    ZeroRateLimit { dependency: String },

    #[error("dependency '{dependency}': rate limit window must be longer than 0ms")]
    ZeroWindow { dependency: String },

    #[error("dependency '{dependency}': failure threshold must be at least 1")]
    ZeroFailureThreshold { dependency: String },

    #[error("dependency '{dependency}': rolling interval must be longer than 0ms")]
    ZeroRollingInterval { dependency: String },

    #[error("retry max_attempts must be at least 1")]
    ZeroRetryAttempts,

    #[error("pipeline http_timeout_secs must be at least 1")]
    ZeroHttpTimeout,
}
