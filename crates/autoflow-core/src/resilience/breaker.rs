//! Circuit breaker for one external dependency.
//!
//! - **Closed**: calls pass through. Failures within the rolling interval
//!   accumulate; `failure_threshold` consecutive failures open the circuit.
//! - **Open**: calls fail fast with `CircuitOpen` until `cooldown_ms` has
//!   elapsed since the last failure.
//! - **HalfOpen**: exactly one probe call is in flight. Other callers are
//!   rejected. A successful probe closes the circuit, a failed one reopens it.
//!
//! All state lives behind one mutex. Admission and outcome recording each
//! take the lock once and never hold it across an await.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use autoflow_types::config::BreakerConfig;
use autoflow_types::resilience::{BreakerStatus, CircuitState};
use tokio::time::Instant;

use super::error::ResilienceError;

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    /// First failure of the current consecutive streak.
    streak_started_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    last_probe_at: Option<Instant>,
    probe_in_flight: bool,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
    last_error: Option<String>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            streak_started_at: None,
            last_failure_at: None,
            last_probe_at: None,
            probe_in_flight: false,
            total_calls: 0,
            total_failures: 0,
            total_rejections: 0,
            last_error: None,
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.streak_started_at = None;
        self.probe_in_flight = false;
    }
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Normal call while Closed.
    Pass,
    /// The single recovery probe while HalfOpen.
    Probe,
}

/// Guards one operation against a dependency judged unhealthy.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current recorded state. An Open circuit whose cooldown has elapsed
    /// still reports Open until the next call probes it.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Invoke `operation` if the circuit allows it and record the outcome.
    ///
    /// Any `Err` from the operation counts as a failure, as does exceeding
    /// `call_timeout_ms` when configured.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let admission = self.admit()?;
        let mut probe = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let outcome = match self.config.call_timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), operation()).await {
                    Ok(result) => result.map_err(|error| self.operation_error(error)),
                    Err(_elapsed) => Err(ResilienceError::Timeout {
                        dependency: self.name.clone(),
                        timeout_ms,
                    }),
                }
            }
            None => operation().await.map_err(|error| self.operation_error(error)),
        };

        match &outcome {
            Ok(_) => self.record_success(admission),
            Err(err) => self.record_failure(admission, err.to_string()),
        }
        probe.armed = false;

        outcome
    }

    /// Snapshot for status displays.
    pub fn status(&self) -> BreakerStatus {
        let state = self.lock();
        let now = Instant::now();
        let ms_ago = |at: Instant| now.duration_since(at).as_millis() as u64;
        BreakerStatus {
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            total_rejections: state.total_rejections,
            last_error: state.last_error.clone(),
            last_failure_ms_ago: state.last_failure_at.map(ms_ago),
            last_probe_ms_ago: state.last_probe_at.map(ms_ago),
        }
    }

    /// Force the circuit closed and clear the failure streak.
    pub fn reset(&self) {
        self.lock().close();
        tracing::info!(dependency = %self.name, "circuit breaker reset");
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn operation_error<E>(&self, error: E) -> ResilienceError<E> {
        ResilienceError::Operation {
            dependency: self.name.clone(),
            error,
        }
    }

    fn admit<E>(&self) -> Result<Admission, ResilienceError<E>> {
        let mut state = self.lock();
        let now = Instant::now();

        let admission = match state.state {
            CircuitState::Closed => Some(Admission::Pass),
            CircuitState::Open => {
                let cooldown = Duration::from_millis(self.config.cooldown_ms);
                let cooled_down = state
                    .last_failure_at
                    .is_none_or(|at| now.duration_since(at) >= cooldown);
                cooled_down.then_some(Admission::Probe)
            }
            CircuitState::HalfOpen => (!state.probe_in_flight).then_some(Admission::Probe),
        };

        match admission {
            Some(Admission::Probe) => {
                state.state = CircuitState::HalfOpen;
                state.probe_in_flight = true;
                state.last_probe_at = Some(now);
                tracing::info!(dependency = %self.name, "circuit half-open, probing");
                Ok(Admission::Probe)
            }
            Some(Admission::Pass) => Ok(Admission::Pass),
            None => {
                state.total_rejections += 1;
                tracing::debug!(
                    dependency = %self.name,
                    state = %state.state,
                    "call rejected by open circuit"
                );
                Err(ResilienceError::CircuitOpen {
                    dependency: self.name.clone(),
                })
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut state = self.lock();
        state.total_calls += 1;

        match admission {
            Admission::Probe => {
                state.close();
                tracing::info!(dependency = %self.name, "probe succeeded, circuit closed");
            }
            // A call admitted before the circuit opened says nothing about recovery.
            Admission::Pass if state.state == CircuitState::Closed => {
                state.consecutive_failures = 0;
                state.streak_started_at = None;
            }
            Admission::Pass => {}
        }
    }

    fn record_failure(&self, admission: Admission, error: String) {
        let mut state = self.lock();
        let now = Instant::now();
        state.total_calls += 1;
        state.total_failures += 1;
        state.last_error = Some(error);

        match admission {
            Admission::Probe => {
                state.state = CircuitState::Open;
                state.probe_in_flight = false;
                state.last_failure_at = Some(now);
                tracing::warn!(dependency = %self.name, "probe failed, circuit reopened");
            }
            Admission::Pass if state.state == CircuitState::Closed => {
                let rolling = Duration::from_millis(self.config.rolling_interval_ms);
                let in_streak = state
                    .streak_started_at
                    .is_some_and(|start| now.duration_since(start) <= rolling);
                if in_streak {
                    state.consecutive_failures += 1;
                } else {
                    state.consecutive_failures = 1;
                    state.streak_started_at = Some(now);
                }

                if state.consecutive_failures >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    state.last_failure_at = Some(now);
                    tracing::warn!(
                        dependency = %self.name,
                        failures = state.consecutive_failures,
                        cooldown_ms = self.config.cooldown_ms,
                        "circuit opened"
                    );
                }
            }
            Admission::Pass => {}
        }
    }
}

/// Releases the probe slot if the probe future is dropped before it resolves,
/// so a cancelled caller cannot wedge the circuit in HalfOpen.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.breaker.lock();
        if state.probe_in_flight {
            state.probe_in_flight = false;
            state.state = CircuitState::Open;
            tracing::debug!(dependency = %self.breaker.name, "probe cancelled, circuit reopened");
        }
    }
}
