//! Workflow file parsing and validation.
//!
//! A workflow file names the run, gives the initial context and lists the
//! steps in execution order. Each step names a built-in module and carries
//! that module's parameters inline:
//!
//! ```yaml
//! name: daily-digest
//! context:
//!   count: 0
//! steps:
//!   - name: add1
//!     module: increment
//!     field: count
//!   - name: fetch
//!     module: http_get
//!     url: https://example.com/feed.json
//!     dependency: newsapi
//!     output_field: feed
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while loading a workflow file.
#[derive(Debug, Error)]
pub enum WorkflowFileError {
    /// YAML/JSON parse failure, including unknown modules and missing parameters.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A parsed workflow file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub name: String,

    /// Initial context handed to the first step.
    #[serde(default = "empty_context")]
    pub context: Value,

    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

fn empty_context() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One step entry: a display name plus the module it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,

    #[serde(flatten)]
    pub module: ModuleSpec,
}

/// Built-in step modules and their parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum ModuleSpec {
    /// Set a top-level context field.
    Set { field: String, value: Value },

    /// Add `by` to a numeric context field (missing counts as 0).
    Increment {
        field: String,
        #[serde(default = "default_increment")]
        by: i64,
    },

    /// GET `url` through the named dependency and store the body in `output_field`.
    HttpGet {
        url: String,
        dependency: String,
        output_field: String,
    },

    /// Always fail with `message`.
    Fail { message: String },
}

fn default_increment() -> i64 {
    1
}

impl ModuleSpec {
    pub fn module_name(&self) -> &'static str {
        match self {
            ModuleSpec::Set { .. } => "set",
            ModuleSpec::Increment { .. } => "increment",
            ModuleSpec::HttpGet { .. } => "http_get",
            ModuleSpec::Fail { .. } => "fail",
        }
    }
}

/// Parse a JSON workflow and validate it.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowFile, WorkflowFileError> {
    let workflow: WorkflowFile =
        serde_json::from_str(json).map_err(|e| WorkflowFileError::ParseError(e.to_string()))?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Parse a YAML workflow and validate it.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowFile, WorkflowFileError> {
    let workflow: WorkflowFile =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowFileError::ParseError(e.to_string()))?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Load a workflow from disk. `.yaml`/`.yml` files are read as YAML,
/// everything else as JSON.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowFile, WorkflowFileError> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        parse_workflow_yaml(&content)
    } else {
        parse_workflow_json(&content)
    }
}

/// Check structural constraints the deserializer cannot express.
///
/// Duplicate step names are allowed (results are positional) but logged.
pub fn validate_workflow(workflow: &WorkflowFile) -> Result<(), WorkflowFileError> {
    if workflow.name.trim().is_empty() {
        return Err(WorkflowFileError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }
    if !workflow.context.is_object() {
        return Err(WorkflowFileError::ValidationError(
            "workflow context must be a JSON object".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, step) in workflow.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(WorkflowFileError::ValidationError(format!(
                "step {index} has an empty name"
            )));
        }
        if !seen.insert(step.name.as_str()) {
            tracing::warn!(workflow = %workflow.name, step = %step.name, "duplicate step name");
        }
        validate_module(&step.name, &step.module)?;
    }
    Ok(())
}

fn validate_module(step: &str, module: &ModuleSpec) -> Result<(), WorkflowFileError> {
    let invalid = |reason: &str| -> Result<(), WorkflowFileError> {
        Err(WorkflowFileError::ValidationError(format!(
            "step '{step}' ({}): {reason}",
            module.module_name()
        )))
    };

    match module {
        ModuleSpec::Set { field, .. } | ModuleSpec::Increment { field, .. } if field.is_empty() => {
            invalid("field must not be empty")
        }
        ModuleSpec::HttpGet { url, .. } if !(url.starts_with("http://") || url.starts_with("https://")) => {
            invalid("url must start with http:// or https://")
        }
        ModuleSpec::HttpGet { dependency, .. } if dependency.trim().is_empty() => {
            invalid("dependency must not be empty")
        }
        ModuleSpec::HttpGet { output_field, .. } if output_field.is_empty() => {
            invalid("output_field must not be empty")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const COUNTER_YAML: &str = r#"
name: counter
context:
  count: 0
steps:
  - name: add1
    module: increment
    field: count
  - name: add2
    module: increment
    field: count
    by: 2
  - name: label
    module: set
    field: label
    value: done
"#;

    #[test]
    fn parse_yaml_workflow() {
        let workflow = parse_workflow_yaml(COUNTER_YAML).unwrap();
        assert_eq!(workflow.name, "counter");
        assert_eq!(workflow.context, json!({"count": 0}));
        assert_eq!(workflow.steps.len(), 3);
        assert_eq!(
            workflow.steps[0].module,
            ModuleSpec::Increment {
                field: "count".to_string(),
                by: 1
            }
        );
        assert_eq!(
            workflow.steps[2].module,
            ModuleSpec::Set {
                field: "label".to_string(),
                value: json!("done")
            }
        );
    }

    #[test]
    fn parse_json_workflow() {
        let json = r#"{
            "name": "fetch",
            "steps": [
                {"name": "get", "module": "http_get", "url": "https://example.com/a",
                 "dependency": "newsapi", "output_field": "articles"},
                {"name": "stop", "module": "fail", "message": "boom"}
            ]
        }"#;
        let workflow = parse_workflow_json(json).unwrap();
        assert_eq!(workflow.context, json!({}));
        assert_eq!(workflow.steps[0].module.module_name(), "http_get");
        assert_eq!(
            workflow.steps[1].module,
            ModuleSpec::Fail {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn unknown_module_is_parse_error() {
        let json = r#"{"name": "x", "steps": [{"name": "s", "module": "teleport"}]}"#;
        let err = parse_workflow_json(json).unwrap_err();
        assert!(matches!(err, WorkflowFileError::ParseError(_)));
    }

    #[test]
    fn missing_parameter_is_parse_error() {
        let json = r#"{"name": "x", "steps": [{"name": "s", "module": "set", "field": "a"}]}"#;
        let err = parse_workflow_json(json).unwrap_err();
        assert!(matches!(err, WorkflowFileError::ParseError(_)));
    }

    #[test]
    fn non_object_context_rejected() {
        let json = r#"{"name": "x", "context": [1, 2], "steps": []}"#;
        let err = parse_workflow_json(json).unwrap_err();
        assert!(matches!(err, WorkflowFileError::ValidationError(_)));
    }

    #[test]
    fn bad_url_rejected() {
        let json = r#"{"name": "x", "steps": [{"name": "get", "module": "http_get",
            "url": "ftp://example.com", "dependency": "d", "output_field": "o"}]}"#;
        let err = parse_workflow_json(json).unwrap_err();
        assert!(err.to_string().contains("step 'get' (http_get)"));
    }

    #[test]
    fn duplicate_step_names_allowed() {
        let json = r#"{"name": "x", "steps": [
            {"name": "inc", "module": "increment", "field": "n"},
            {"name": "inc", "module": "increment", "field": "n"}
        ]}"#;
        assert_eq!(parse_workflow_json(json).unwrap().steps.len(), 2);
    }

    #[test]
    fn load_by_extension() {
        let dir = tempdir().unwrap();

        let yaml_path = dir.path().join("counter.yml");
        std::fs::write(&yaml_path, COUNTER_YAML).unwrap();
        assert_eq!(load_workflow_file(&yaml_path).unwrap().steps.len(), 3);

        let json_path = dir.path().join("empty.json");
        std::fs::write(&json_path, r#"{"name": "empty"}"#).unwrap();
        assert!(load_workflow_file(&json_path).unwrap().steps.is_empty());

        let missing = load_workflow_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, WorkflowFileError::IoError(_)));
    }
}
