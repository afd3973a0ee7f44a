//! Pipeline run outcome types.
//!
//! A run produces one `StepResult` per attempted step, in execution order,
//! and an `ExecutionReport` that the persistence and rendering collaborators
//! consume.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a step failure.
///
/// The engine records the kind but never branches on it; callers inspecting
/// a report use it to tell throttling and open circuits apart from genuine
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// Validation or business-rule failure raised by the step itself.
    Failed,
    /// A protected call was refused because the circuit is open.
    CircuitOpen,
    /// A protected call was refused because the rate limit queue or wait bound was exceeded.
    RateLimited,
    /// The step or one of its calls exceeded its deadline.
    Timeout,
    /// An external dependency was called and failed.
    Dependency,
}

impl fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepErrorKind::Failed => write!(f, "failed"),
            StepErrorKind::CircuitOpen => write!(f, "circuit_open"),
            StepErrorKind::RateLimited => write!(f, "rate_limited"),
            StepErrorKind::Timeout => write!(f, "timeout"),
            StepErrorKind::Dependency => write!(f, "dependency"),
        }
    }
}

/// Outcome of one attempted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<StepErrorKind>,
}

impl StepResult {
    /// A successful step.
    pub fn succeeded(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            success: true,
            duration_ms,
            error: None,
            error_kind: None,
        }
    }

    /// A failed step with its reason.
    pub fn failed(
        name: impl Into<String>,
        duration_ms: u64,
        error: impl Into<String>,
        kind: StepErrorKind,
    ) -> Self {
        Self {
            name: name.into(),
            success: false,
            duration_ms,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }
}

/// Structured outcome of one pipeline run.
///
/// `success` is true iff every step succeeded; `final_data` is present iff
/// `success` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport<C> {
    pub success: bool,
    pub results: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_data: Option<C>,
}

impl<C> ExecutionReport<C> {
    /// Report for a run where every step succeeded.
    pub fn completed(results: Vec<StepResult>, final_data: C) -> Self {
        Self {
            success: true,
            results,
            final_data: Some(final_data),
        }
    }

    /// Report for a run halted at its last recorded step.
    pub fn halted(results: Vec<StepResult>) -> Self {
        Self {
            success: false,
            results,
            final_data: None,
        }
    }

    /// The step that halted the run, if any.
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.results.iter().find(|r| !r.success)
    }

    /// Sum of the recorded step durations.
    pub fn total_duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_step_lookup() {
        let report: ExecutionReport<()> = ExecutionReport::halted(vec![
            StepResult::succeeded("add1", 3),
            StepResult::failed("fail", 4, "boom", StepErrorKind::Failed),
        ]);
        let failed = report.failed_step().unwrap();
        assert_eq!(failed.name, "fail");
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(report.total_duration_ms(), 7);
        assert!(report.final_data.is_none());
    }

    #[test]
    fn test_completed_report_has_no_failed_step() {
        let report = ExecutionReport::completed(vec![StepResult::succeeded("a", 1)], 42);
        assert!(report.success);
        assert!(report.failed_step().is_none());
        assert_eq!(report.final_data, Some(42));
    }

    #[test]
    fn test_report_serializes_for_persistence() {
        let report = ExecutionReport::completed(
            vec![StepResult::succeeded("add1", 0)],
            json!({"count": 1}),
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["final_data"], json!({"count": 1}));
        // Successful steps carry no error fields.
        assert!(value["results"][0].get("error").is_none());

        let halted: ExecutionReport<serde_json::Value> = ExecutionReport::halted(vec![
            StepResult::failed("post", 9, "circuit open", StepErrorKind::CircuitOpen),
        ]);
        let value = serde_json::to_value(&halted).unwrap();
        assert!(value.get("final_data").is_none());
        assert_eq!(value["results"][0]["error_kind"], json!("circuit_open"));
    }

    #[test]
    fn test_error_kind_display_matches_serde() {
        for kind in [
            StepErrorKind::Failed,
            StepErrorKind::CircuitOpen,
            StepErrorKind::RateLimited,
            StepErrorKind::Timeout,
            StepErrorKind::Dependency,
        ] {
            let serialized = serde_json::to_value(kind).unwrap();
            assert_eq!(serialized, json!(kind.to_string()));
        }
    }
}
