//! Pipeline engine and resilience layer for Autoflow.
//!
//! - `pipeline` -- ordered-step execution over a caller-defined context
//! - `resilience` -- rate limiter, circuit breaker and the per-dependency
//!   registry every step uses to reach external services
//! - `event` -- broadcast bus for pipeline lifecycle events
//!
//! This crate depends only on `autoflow-types` -- never on
//! `autoflow-infra` or any network/file IO crate.

pub mod event;
pub mod pipeline;
pub mod resilience;
