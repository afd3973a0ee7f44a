//! Sequential pipeline executor.
//!
//! Runs steps strictly in order, threading each step's output context into
//! the next, and halts at the first failure. The engine treats every
//! `StepError` the same way; the recorded `error_kind` is for callers
//! inspecting the report.

use autoflow_types::event::PipelineEvent;
use autoflow_types::pipeline::{ExecutionReport, StepResult};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::event::EventBus;

use super::step::Step;

/// Executes ordered steps over a caller-defined context.
///
/// Holds no state between runs, so one engine can execute any number of
/// pipelines concurrently.
#[derive(Debug, Clone, Default)]
pub struct PipelineEngine {
    event_bus: Option<EventBus>,
}

impl PipelineEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish lifecycle events for every run on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run `steps` in order starting from `initial`.
    ///
    /// Returns a report with one result per attempted step. On failure the
    /// failing step is the last result and no final context is returned.
    pub async fn execute<C: Send + 'static>(
        &self,
        initial: C,
        steps: &[Step<C>],
    ) -> ExecutionReport<C> {
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline.run", run_id = %run_id, total_steps = steps.len());
        self.run(run_id, initial, steps).instrument(span).await
    }

    async fn run<C: Send + 'static>(
        &self,
        run_id: Uuid,
        initial: C,
        steps: &[Step<C>],
    ) -> ExecutionReport<C> {
        let run_started = Instant::now();
        self.publish(|| PipelineEvent::RunStarted {
            run_id,
            total_steps: steps.len(),
            started_at: Utc::now(),
        });

        let mut results = Vec::with_capacity(steps.len());
        let mut context = initial;

        for (index, step) in steps.iter().enumerate() {
            let name = step.name();
            self.publish(|| PipelineEvent::StepStarted {
                run_id,
                index,
                step_name: name.to_string(),
            });

            let step_started = Instant::now();
            let outcome = step
                .run(context)
                .instrument(info_span!("pipeline.step", step = name, index))
                .await;
            let duration_ms = elapsed_ms(step_started);

            match outcome {
                Ok(next) => {
                    debug!(run_id = %run_id, step = name, duration_ms, "step completed");
                    results.push(StepResult::succeeded(name, duration_ms));
                    self.publish(|| PipelineEvent::StepCompleted {
                        run_id,
                        step_name: name.to_string(),
                        duration_ms,
                    });
                    context = next;
                }
                Err(err) => {
                    let kind = err.kind();
                    let error = err.to_string();
                    warn!(
                        run_id = %run_id,
                        step = name,
                        %kind,
                        error = %error,
                        duration_ms,
                        "step failed, halting pipeline"
                    );
                    results.push(StepResult::failed(name, duration_ms, error.clone(), kind));
                    self.publish(|| PipelineEvent::StepFailed {
                        run_id,
                        step_name: name.to_string(),
                        error: error.clone(),
                        kind,
                    });
                    self.publish(|| PipelineEvent::RunFailed {
                        run_id,
                        failed_step: name.to_string(),
                        error,
                    });
                    return ExecutionReport::halted(results);
                }
            }
        }

        let duration_ms = elapsed_ms(run_started);
        debug!(run_id = %run_id, steps = results.len(), duration_ms, "pipeline completed");
        self.publish(|| PipelineEvent::RunCompleted {
            run_id,
            duration_ms,
            steps_completed: results.len(),
        });
        ExecutionReport::completed(results, context)
    }

    fn publish(&self, event: impl FnOnce() -> PipelineEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event());
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
