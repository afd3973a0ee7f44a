//! Built-in step modules over a JSON context.
//!
//! `WorkflowCompiler` turns the `StepSpec`s of a workflow file into engine
//! steps. Modules that reach the network go through the shared
//! `ResilienceRegistry` under the dependency name given in the file, so all
//! workflows in a process share one quota and one circuit per dependency.

use std::sync::Arc;
use std::time::Duration;

use autoflow_core::pipeline::{RetryPolicy, Step, StepError, StepTransform};
use autoflow_core::resilience::ResilienceRegistry;
use autoflow_types::config::PipelineConfig;
use serde_json::Value;

use super::file::{ModuleSpec, StepSpec, WorkflowFile};

/// Compiles workflow files into steps wrapped with the configured timeout
/// and retry policy.
#[derive(Debug, Clone)]
pub struct WorkflowCompiler {
    registry: Arc<ResilienceRegistry>,
    http: reqwest::Client,
    pipeline: PipelineConfig,
}

impl WorkflowCompiler {
    pub fn new(registry: Arc<ResilienceRegistry>, pipeline: PipelineConfig) -> Self {
        // A request that outlives the step deadline would be dropped before the
        // breaker records it, so the client deadline never exceeds it.
        let http = reqwest::Client::builder()
            .user_agent("autoflow/0.1")
            .timeout(Duration::from_secs(pipeline.effective_http_timeout_secs()))
            .build()
            .unwrap_or_default();

        Self {
            registry,
            http,
            pipeline,
        }
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    /// Build one step per entry, in file order.
    pub fn compile(&self, workflow: &WorkflowFile) -> Vec<Step<Value>> {
        workflow
            .steps
            .iter()
            .map(|spec| self.apply_wrappers(self.build_step(spec)))
            .collect()
    }

    /// Apply the configured step deadline, then retry around it so every
    /// attempt gets a fresh deadline.
    fn apply_wrappers(&self, mut step: Step<Value>) -> Step<Value> {
        if let Some(secs) = self.pipeline.step_timeout_secs {
            step = step.with_timeout(Duration::from_secs(secs));
        }
        let retry = RetryPolicy::from(&self.pipeline.retry);
        if retry.max_attempts > 1 {
            step = step.with_retry(retry);
        }
        step
    }

    fn build_step(&self, spec: &StepSpec) -> Step<Value> {
        match &spec.module {
            ModuleSpec::Set { field, value } => Step::new(
                &spec.name,
                SetField {
                    field: field.clone(),
                    value: value.clone(),
                },
            ),
            ModuleSpec::Increment { field, by } => Step::new(
                &spec.name,
                Increment {
                    field: field.clone(),
                    by: *by,
                },
            ),
            ModuleSpec::HttpGet {
                url,
                dependency,
                output_field,
            } => Step::new(
                &spec.name,
                HttpGet {
                    url: url.clone(),
                    dependency: dependency.clone(),
                    output_field: output_field.clone(),
                    registry: Arc::clone(&self.registry),
                    http: self.http.clone(),
                },
            ),
            ModuleSpec::Fail { message } => Step::new(
                &spec.name,
                Fail {
                    message: message.clone(),
                },
            ),
        }
    }
}

fn set_field(context: &mut Value, field: &str, value: Value) -> Result<(), StepError> {
    match context.as_object_mut() {
        Some(object) => {
            object.insert(field.to_string(), value);
            Ok(())
        }
        None => Err(StepError::failed("context is not a JSON object")),
    }
}

struct SetField {
    field: String,
    value: Value,
}

impl StepTransform<Value> for SetField {
    async fn apply(&self, mut context: Value) -> Result<Value, StepError> {
        set_field(&mut context, &self.field, self.value.clone())?;
        Ok(context)
    }
}

struct Increment {
    field: String,
    by: i64,
}

impl StepTransform<Value> for Increment {
    async fn apply(&self, mut context: Value) -> Result<Value, StepError> {
        let overflowed = || StepError::failed(format!("field '{}' overflowed", self.field));

        let next = match context.get(&self.field) {
            None | Some(Value::Null) => Value::from(self.by),
            Some(Value::Number(current)) => match current.as_i64() {
                Some(current) => Value::from(current.checked_add(self.by).ok_or_else(overflowed)?),
                None => {
                    let current = current.as_f64().ok_or_else(overflowed)?;
                    serde_json::Number::from_f64(current + self.by as f64)
                        .map(Value::Number)
                        .ok_or_else(overflowed)?
                }
            },
            Some(_) => {
                return Err(StepError::failed(format!(
                    "field '{}' is not a number",
                    self.field
                )));
            }
        };
        set_field(&mut context, &self.field, next)?;
        Ok(context)
    }
}

struct Fail {
    message: String,
}

impl StepTransform<Value> for Fail {
    async fn apply(&self, _context: Value) -> Result<Value, StepError> {
        Err(StepError::failed(self.message.clone()))
    }
}

/// Failure of a single HTTP fetch.
#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
}

struct HttpGet {
    url: String,
    dependency: String,
    output_field: String,
    registry: Arc<ResilienceRegistry>,
    http: reqwest::Client,
}

impl HttpGet {
    /// GET the URL, returning the body as JSON when it parses, else as text.
    async fn fetch(&self) -> Result<Value, FetchError> {
        let response = self.http.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: self.url.clone(),
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text)))
    }
}

impl StepTransform<Value> for HttpGet {
    async fn apply(&self, mut context: Value) -> Result<Value, StepError> {
        tracing::debug!(dependency = %self.dependency, url = %self.url, "fetching");
        let body = self
            .registry
            .protected_call(&self.dependency, || self.fetch())
            .await?;
        set_field(&mut context, &self.output_field, body)?;
        Ok(context)
    }
}
