//! Process-wide registry of protected dependencies.
//!
//! Each dependency name maps to exactly one limiter + breaker pair, created
//! on first use from the matching `ResilienceConfig` entry. Every caller that
//! names the same dependency shares that pair, so concurrent pipelines draw
//! from one quota and trip one circuit.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use autoflow_types::config::{DependencyConfig, ResilienceConfig};
use autoflow_types::resilience::DependencyStatus;
use dashmap::DashMap;

use super::breaker::CircuitBreaker;
use super::error::ResilienceError;
use super::limiter::RateLimiter;

/// Rate limiter and circuit breaker guarding one external dependency.
#[derive(Debug)]
pub struct ProtectedDependency {
    name: String,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

impl ProtectedDependency {
    pub fn new(name: impl Into<String>, config: DependencyConfig) -> Self {
        let name = name.into();
        Self {
            limiter: RateLimiter::new(name.clone(), config.rate_limit),
            breaker: CircuitBreaker::new(name.clone(), config.breaker),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Wait for quota, then run `operation` through the circuit breaker.
    ///
    /// Admission is taken before the breaker is consulted, so a call rejected
    /// by an open circuit still consumes quota.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.limiter
            .acquire()
            .await
            .map_err(|reason| ResilienceError::RateLimited {
                dependency: self.name.clone(),
                reason,
            })?;
        self.breaker.call(operation).await
    }

    pub fn status(&self) -> DependencyStatus {
        DependencyStatus {
            name: self.name.clone(),
            breaker: self.breaker.status(),
            limiter: self.limiter.status(),
        }
    }
}

/// Lazily-populated map from dependency name to its protection.
#[derive(Debug, Default)]
pub struct ResilienceRegistry {
    config: ResilienceConfig,
    dependencies: DashMap<String, Arc<ProtectedDependency>>,
}

impl ResilienceRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            dependencies: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Get the shared protection for `name`, creating it on first use.
    pub fn dependency(&self, name: &str) -> Arc<ProtectedDependency> {
        if let Some(existing) = self.dependencies.get(name) {
            return Arc::clone(existing.value());
        }

        let entry = self
            .dependencies
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.config.for_dependency(name);
                tracing::debug!(
                    dependency = %name,
                    max_calls = config.rate_limit.max_calls,
                    window_ms = config.rate_limit.window_ms,
                    failure_threshold = config.breaker.failure_threshold,
                    "registering protected dependency"
                );
                Arc::new(ProtectedDependency::new(name, config))
            });
        Arc::clone(entry.value())
    }

    /// Run `operation` under the rate limit and circuit breaker of `dependency`.
    pub async fn protected_call<T, E, F, Fut>(
        &self,
        dependency: &str,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.dependency(dependency).call(operation).await
    }

    /// Wrap a reusable operation so every invocation goes through `dependency`.
    pub fn wrap<F>(&self, dependency: &str, operation: F) -> Protected<F> {
        Protected {
            dependency: self.dependency(dependency),
            operation,
        }
    }

    /// Status of every dependency used so far, ordered by name.
    pub fn snapshot(&self) -> Vec<DependencyStatus> {
        let mut statuses: Vec<_> = self
            .dependencies
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

/// An operation bound to one protected dependency.
#[derive(Debug, Clone)]
pub struct Protected<F> {
    dependency: Arc<ProtectedDependency>,
    operation: F,
}

impl<F> Protected<F> {
    pub fn dependency(&self) -> &ProtectedDependency {
        &self.dependency
    }

    /// Invoke the wrapped operation with `input` under the dependency's
    /// rate limit and circuit breaker.
    pub async fn call<I, T, E, Fut>(&self, input: I) -> Result<T, ResilienceError<E>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.dependency.call(|| (self.operation)(input)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use autoflow_types::config::{BreakerConfig, RateLimitConfig};
    use autoflow_types::resilience::CircuitState;
    use tokio::time::{Duration, Instant};

    use crate::resilience::error::RateLimitRejection;

    fn registry_with(name: &str, config: DependencyConfig) -> ResilienceRegistry {
        ResilienceRegistry::new(ResilienceConfig {
            default: DependencyConfig::default(),
            dependencies: HashMap::from([(name.to_string(), config)]),
        })
    }

    #[test]
    fn test_same_name_returns_same_instance() {
        let registry = ResilienceRegistry::default();
        let first = registry.dependency("openai");
        let second = registry.dependency("openai");
        let other = registry.dependency("twitter");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_dependency_uses_configured_presets() {
        let registry = ResilienceRegistry::default();
        assert_eq!(registry.dependency("openai").limiter().config().max_calls, 500);
        assert_eq!(registry.dependency("twitter").limiter().config().window_ms, 3_600_000);
        assert_eq!(registry.dependency("newsapi").limiter().config().max_calls, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_state_shared_across_callers() {
        let registry = registry_with(
            "newsapi",
            DependencyConfig {
                rate_limit: RateLimitConfig::per_minute(100),
                breaker: BreakerConfig {
                    failure_threshold: 2,
                    ..BreakerConfig::default()
                },
            },
        );

        for _ in 0..2 {
            let result = registry
                .protected_call("newsapi", || async { Err::<(), _>("HTTP 503") })
                .await;
            assert!(matches!(result, Err(ResilienceError::Operation { .. })));
        }

        let invoked = AtomicU32::new(0);
        let counter = &invoked;
        let wrapped = registry.wrap("newsapi", move |_: ()| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        });
        let result = wrapped.call(()).await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(wrapped.dependency().breaker().state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_still_consumes_quota() {
        let registry = registry_with(
            "openai",
            DependencyConfig {
                rate_limit: RateLimitConfig::per_minute(3).with_max_wait_ms(10),
                breaker: BreakerConfig {
                    failure_threshold: 1,
                    ..BreakerConfig::default()
                },
            },
        );

        let failed = registry
            .protected_call("openai", || async { Err::<(), _>("boom") })
            .await;
        assert!(matches!(failed, Err(ResilienceError::Operation { .. })));

        let rejected = registry
            .protected_call("openai", || async { Ok::<_, String>(()) })
            .await;
        assert!(matches!(rejected, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(registry.dependency("openai").limiter().status().admitted_in_window, 2);

        let _ = registry
            .protected_call("openai", || async { Ok::<_, String>(()) })
            .await;
        let exhausted = registry
            .protected_call("openai", || async { Ok::<_, String>(()) })
            .await;
        assert!(matches!(
            exhausted,
            Err(ResilienceError::RateLimited {
                reason: RateLimitRejection::WaitExceeded { .. },
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrapped_operation_passes_input_through() {
        let registry = ResilienceRegistry::default();
        let double = registry.wrap("calculator", |n: u32| async move { Ok::<_, String>(n * 2) });

        let started = Instant::now();
        assert_eq!(double.call(21).await.unwrap(), 42);
        assert_eq!(double.call(5).await.unwrap(), 10);
        assert!(started.elapsed() < Duration::from_millis(1));
        assert_eq!(double.dependency().name(), "calculator");
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_sorted_by_name() {
        let registry = ResilienceRegistry::default();
        registry.dependency("twitter");
        registry.dependency("newsapi");
        registry
            .protected_call("openai", || async { Ok::<_, String>(()) })
            .await
            .unwrap();

        let snapshot = registry.snapshot();
        let names: Vec<_> = snapshot.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["newsapi", "openai", "twitter"]);
        assert_eq!(snapshot[1].breaker.total_calls, 1);
        assert_eq!(snapshot[1].limiter.admitted_in_window, 1);
    }
}
