//! Workflow files and their compilation into pipeline steps.
//!
//! - `file` -- on-disk format (JSON or YAML) and validation
//! - `modules` -- built-in step modules and the compiler that wraps them

pub mod file;
pub mod modules;

pub use file::{ModuleSpec, StepSpec, WorkflowFile, WorkflowFileError, load_workflow_file};
pub use modules::WorkflowCompiler;
