//! Global configuration types for Autoflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! per-dependency rate limits, circuit breaker thresholds and the default
//! step wrappers applied when compiling workflow files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for the Autoflow platform.
///
/// Loaded from `~/.autoflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Rate limiter and circuit breaker settings per external dependency.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Step wrapper defaults (timeouts, retries).
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl GlobalConfig {
    /// Reject settings that would make a limiter or breaker unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resilience.default.validate("default")?;
        for (name, dependency) in &self.resilience.dependencies {
            dependency.validate(name)?;
        }
        if self.pipeline.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if self.pipeline.http_timeout_secs == 0 {
            return Err(ConfigError::ZeroHttpTimeout);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resilience
// ---------------------------------------------------------------------------

/// Resilience settings: a default applied to every dependency name plus
/// explicit overrides keyed by dependency name (e.g. "openai", "twitter").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub default: DependencyConfig,

    #[serde(default = "default_dependencies")]
    pub dependencies: HashMap<String, DependencyConfig>,
}

impl ResilienceConfig {
    /// Resolve the settings for a dependency name, falling back to `default`.
    pub fn for_dependency(&self, name: &str) -> DependencyConfig {
        self.dependencies
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            default: DependencyConfig::default(),
            dependencies: default_dependencies(),
        }
    }
}

/// Known quotas of the services the built-in modules talk to.
fn default_dependencies() -> HashMap<String, DependencyConfig> {
    HashMap::from([
        (
            "openai".to_string(),
            DependencyConfig {
                rate_limit: RateLimitConfig::per_minute(500),
                breaker: BreakerConfig::default(),
            },
        ),
        (
            "twitter".to_string(),
            DependencyConfig {
                rate_limit: RateLimitConfig::per_hour(50),
                breaker: BreakerConfig::default(),
            },
        ),
    ])
}

/// Limiter and breaker settings for one dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl DependencyConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let dependency = name.to_string();
        if self.rate_limit.max_calls == 0 {
            return Err(ConfigError::ZeroRateLimit { dependency });
        }
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::ZeroWindow { dependency });
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold { dependency });
        }
        if self.breaker.rolling_interval_ms == 0 {
            return Err(ConfigError::ZeroRollingInterval { dependency });
        }
        Ok(())
    }
}

/// Fixed-window quota for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum calls admitted per window.
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum number of callers allowed to wait for capacity.
    /// `None` means the queue is unbounded.
    #[serde(default)]
    pub max_queue: Option<usize>,

    /// Maximum time a caller may wait for capacity, in milliseconds.
    /// `None` means callers wait until admitted.
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
}

fn default_max_calls() -> u32 {
    60
}

fn default_window_ms() -> u64 {
    60_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_ms: default_window_ms(),
            max_queue: None,
            max_wait_ms: None,
        }
    }
}

impl RateLimitConfig {
    /// Create a quota of `max_calls` per minute.
    pub fn per_minute(max_calls: u32) -> Self {
        Self {
            max_calls,
            window_ms: 60_000,
            ..Self::default()
        }
    }

    /// Create a quota of `max_calls` per hour.
    pub fn per_hour(max_calls: u32) -> Self {
        Self {
            max_calls,
            window_ms: 3_600_000,
            ..Self::default()
        }
    }

    /// Bound the number of queued callers.
    pub fn with_max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = Some(max_queue);
        self
    }

    /// Bound how long a caller may wait for capacity.
    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = Some(max_wait_ms);
        self
    }
}

/// Circuit breaker thresholds for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures (within `rolling_interval_ms`) that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Window in which the consecutive failures must occur.
    #[serde(default = "default_rolling_interval_ms")]
    pub rolling_interval_ms: u64,

    /// How long the circuit stays open before a probe is allowed.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Optional per-call deadline; an elapsed deadline counts as a failure.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_rolling_interval_ms() -> u64 {
    60_000
}

fn default_cooldown_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            rolling_interval_ms: default_rolling_interval_ms(),
            cooldown_ms: default_cooldown_ms(),
            call_timeout_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Defaults for the wrappers applied to compiled workflow steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-step deadline in seconds. `None` disables the deadline.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: Option<u64>,

    /// Deadline for a single outbound HTTP request made by a step module.
    /// Capped at `step_timeout_secs` so a hung request always ends inside
    /// the dependency's circuit breaker.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_step_timeout_secs() -> Option<u64> {
    Some(300)
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl PipelineConfig {
    /// HTTP request deadline, never longer than the step deadline.
    pub fn effective_http_timeout_secs(&self) -> u64 {
        match self.step_timeout_secs {
            Some(step) => self.http_timeout_secs.min(step),
            None => self.http_timeout_secs,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            retry: RetrySettings::default(),
        }
    }
}

/// Retry settings for transient step failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one. 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    1_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.resilience.default.rate_limit.max_calls, 60);
        assert_eq!(config.resilience.default.breaker.failure_threshold, 5);
        assert_eq!(config.pipeline.step_timeout_secs, Some(300));
        assert_eq!(config.pipeline.retry.max_attempts, 1);
        assert_eq!(config.pipeline.http_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_timeout_capped_by_step_timeout() {
        let mut pipeline = PipelineConfig::default();
        assert_eq!(pipeline.effective_http_timeout_secs(), 30);

        pipeline.step_timeout_secs = Some(10);
        assert_eq!(pipeline.effective_http_timeout_secs(), 10);

        pipeline.step_timeout_secs = None;
        assert_eq!(pipeline.effective_http_timeout_secs(), 30);
    }

    #[test]
    fn test_default_presets_match_service_quotas() {
        let config = ResilienceConfig::default();
        let openai = config.for_dependency("openai");
        assert_eq!(openai.rate_limit.max_calls, 500);
        assert_eq!(openai.rate_limit.window_ms, 60_000);

        let twitter = config.for_dependency("twitter");
        assert_eq!(twitter.rate_limit.max_calls, 50);
        assert_eq!(twitter.rate_limit.window_ms, 3_600_000);
    }

    #[test]
    fn test_unknown_dependency_uses_default() {
        let config = ResilienceConfig::default();
        assert_eq!(config.for_dependency("newsapi"), config.default);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.resilience.default.breaker.cooldown_ms, 30_000);
        assert!(config.resilience.dependencies.contains_key("twitter"));
        assert_eq!(config.pipeline.retry.backoff_ms, 1_000);
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[resilience.default.rate_limit]
max_calls = 10
window_ms = 1000

[resilience.dependencies.newsapi.rate_limit]
max_calls = 100
window_ms = 86400000
max_wait_ms = 5000

[resilience.dependencies.newsapi.breaker]
failure_threshold = 2
cooldown_ms = 10000

[pipeline]
step_timeout_secs = 60

[pipeline.retry]
max_attempts = 3
backoff_ms = 250
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.resilience.default.rate_limit.max_calls, 10);
        // Explicit dependencies replace the presets.
        assert!(!config.resilience.dependencies.contains_key("openai"));

        let news = config.resilience.for_dependency("newsapi");
        assert_eq!(news.rate_limit.max_calls, 100);
        assert_eq!(news.rate_limit.max_wait_ms, Some(5000));
        assert_eq!(news.rate_limit.max_queue, None);
        assert_eq!(news.breaker.failure_threshold, 2);
        assert_eq!(news.breaker.rolling_interval_ms, 60_000);

        assert_eq!(config.pipeline.step_timeout_secs, Some(60));
        assert_eq!(config.pipeline.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = GlobalConfig::default();
        config.resilience.dependencies.insert(
            "broken".to_string(),
            DependencyConfig {
                rate_limit: RateLimitConfig::per_minute(0),
                breaker: BreakerConfig::default(),
            },
        );
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroRateLimit {
                dependency: "broken".to_string()
            })
        );

        let mut config = GlobalConfig::default();
        config.resilience.default.breaker.failure_threshold = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroFailureThreshold {
                dependency: "default".to_string()
            })
        );

        let mut config = GlobalConfig::default();
        config.pipeline.retry.max_attempts = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroRetryAttempts));

        let mut config = GlobalConfig::default();
        config.pipeline.http_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroHttpTimeout));
    }

    #[test]
    fn test_rate_limit_builders() {
        let config = RateLimitConfig::per_minute(3)
            .with_max_queue(2)
            .with_max_wait_ms(500);
        assert_eq!(config.max_calls, 3);
        assert_eq!(config.max_queue, Some(2));
        assert_eq!(config.max_wait_ms, Some(500));
    }
}
