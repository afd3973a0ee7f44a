//! Resilience layer shared by every step that talks to an external service.
//!
//! - `limiter` -- fixed-window quota with FIFO queuing
//! - `breaker` -- consecutive-failure circuit breaker with single-probe recovery
//! - `registry` -- per-dependency limiter + breaker pairs, created lazily and
//!   shared process-wide
//! - `error` -- error kinds surfaced to callers of a protected call

pub mod breaker;
pub mod error;
pub mod limiter;
pub mod registry;

pub use breaker::CircuitBreaker;
pub use error::{RateLimitRejection, ResilienceError};
pub use limiter::RateLimiter;
pub use registry::{Protected, ProtectedDependency, ResilienceRegistry};
