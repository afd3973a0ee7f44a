//! Pipeline engine: ordered steps threaded through an evolving context.
//!
//! - `step` -- step descriptors, the transform trait and its boxed form
//! - `engine` -- sequential executor producing an `ExecutionReport`
//! - `retry` -- retry wrapper for transient step failures

pub mod engine;
pub mod retry;
pub mod step;

pub use engine::PipelineEngine;
pub use retry::RetryPolicy;
pub use step::{BoxStepTransform, Step, StepError, StepTransform};
