//! Event types for the pipeline event bus.
//!
//! `PipelineEvent` is broadcast while a run executes. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::StepErrorKind;

/// Lifecycle events emitted by the pipeline engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run has started.
    RunStarted {
        run_id: Uuid,
        total_steps: usize,
        started_at: DateTime<Utc>,
    },

    /// A step is about to be invoked.
    StepStarted {
        run_id: Uuid,
        /// Position of the step in the run (0-based).
        index: usize,
        step_name: String,
    },

    /// A step returned a new context.
    StepCompleted {
        run_id: Uuid,
        step_name: String,
        duration_ms: u64,
    },

    /// A step failed; the run halts after this event.
    StepFailed {
        run_id: Uuid,
        step_name: String,
        error: String,
        kind: StepErrorKind,
    },

    /// Every step succeeded.
    RunCompleted {
        run_id: Uuid,
        duration_ms: u64,
        steps_completed: usize,
    },

    /// The run halted at `failed_step`.
    RunFailed {
        run_id: Uuid,
        failed_step: String,
        error: String,
    },
}

impl PipelineEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::StepStarted { run_id, .. }
            | PipelineEvent::StepCompleted { run_id, .. }
            | PipelineEvent::StepFailed { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::RunFailed { run_id, .. } => *run_id,
        }
    }
}
