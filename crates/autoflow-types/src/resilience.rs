//! Snapshot types describing the shared resilience state per dependency.
//!
//! These are read-only views for rendering (`aflow run` prints them after a
//! run); the live state is owned by `autoflow-core`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls fail fast until the cooldown elapses.
    Open,
    /// One probe call is in flight to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of one circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Calls that reached the wrapped operation.
    pub total_calls: u64,
    pub total_failures: u64,
    /// Calls refused because the circuit was open or a probe was in flight.
    pub total_rejections: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Milliseconds since the failure that last opened the circuit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_ms_ago: Option<u64>,
    /// Milliseconds since the last recovery probe was admitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probe_ms_ago: Option<u64>,
}

/// Point-in-time view of one rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStatus {
    /// Calls admitted in the current window.
    pub admitted_in_window: u32,
    pub max_calls: u32,
    pub window_ms: u64,
    /// Callers currently waiting for capacity.
    pub queued: usize,
}

/// Combined view of a dependency's limiter and breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub breaker: BreakerStatus,
    pub limiter: LimiterStatus,
}
