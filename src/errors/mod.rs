// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Error types with actionable messages
//!
//! Validation problems are rejected before any task is launched, so most
//! variants here describe a definition or submission that never started.
//! Failures of a stage inside a running pipeline are recorded on the run
//! itself (see [`crate::pipeline::FailureReason`]) rather than raised.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for curaflow operations
pub type CuraflowResult<T> = Result<T, CuraflowError>;

/// Main error type for curaflow
#[derive(Error, Debug, Diagnostic)]
pub enum CuraflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{stage}' requires context key '{key}' which is not available")]
    #[diagnostic(
        code(curaflow::missing_input),
        help("Supply '{key}' in the initial context or add a stage that produces it before '{stage}'")
    )]
    MissingInput { stage: String, key: String },

    #[error("Stage '{name}' is already registered")]
    #[diagnostic(
        code(curaflow::duplicate_stage_name),
        help("Stage names must be unique across the pipeline definition")
    )]
    DuplicateStageName { name: String },

    #[error("Stage '{stage}' not found")]
    #[diagnostic(code(curaflow::stage_not_found))]
    StageNotFound { stage: String },

    #[error("Workflow '{workflow}' not found")]
    #[diagnostic(code(curaflow::workflow_not_found))]
    WorkflowNotFound {
        workflow: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' overwrites '{key}' produced by '{producer}' without declaring it")]
    #[diagnostic(
        code(curaflow::undeclared_overwrite),
        help("Add '{key}' to the 'overwrites' list of stage '{stage}'")
    )]
    UndeclaredOverwrite {
        stage: String,
        key: String,
        producer: String,
    },

    #[error("Circular dependency detected")]
    #[diagnostic(
        code(curaflow::circular_dependency),
        help("Review your stage dependencies to remove the cycle")
    )]
    CircularDependency { stages: Vec<String> },

    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    #[diagnostic(
        code(curaflow::unknown_dependency),
        help("Check that '{dependency}' is part of the requested workflow")
    )]
    UnknownDependency { stage: String, dependency: String },

    #[error("Stage '{stage}' is invalid: {reason}")]
    #[diagnostic(code(curaflow::invalid_stage))]
    InvalidStage { stage: String, reason: String },

    #[error("Context key '{key}' not found")]
    #[diagnostic(code(curaflow::context_key_not_found))]
    ContextKeyNotFound { key: String },

    #[error("Invalid context document: {reason}")]
    #[diagnostic(
        code(curaflow::invalid_context),
        help("The initial context must be a flat object of string keys to string values")
    )]
    InvalidContext { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Bootstrap Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Resource '{resource}' is not ready (state: {state})")]
    #[diagnostic(
        code(curaflow::resource_not_ready),
        help("Run 'curaflow bootstrap create' before submitting workflows that use '{resource}'")
    )]
    ResourceNotReady { resource: String, state: String },

    #[error("Bootstrap of '{resource}' failed: {message}")]
    #[diagnostic(code(curaflow::bootstrap_failed))]
    BootstrapFailed { resource: String, message: String },

    #[error("Unknown bootstrap resource '{resource}'")]
    #[diagnostic(code(curaflow::unknown_resource))]
    UnknownResource { resource: String },

    #[error("No search endpoint configured")]
    #[diagnostic(
        code(curaflow::search_endpoint_missing),
        help("Pass --search-endpoint, set CURAFLOW_SEARCH_ENDPOINT or add search_endpoint to curaflow.toml")
    )]
    SearchEndpointMissing,

    #[error("Search service error: {message}")]
    #[diagnostic(
        code(curaflow::search_service),
        help("Check that the search endpoint is reachable and the caller may manage indexes")
    )]
    SearchService { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to launch task for stage '{stage}': {message}")]
    #[diagnostic(code(curaflow::launch_error))]
    LaunchError {
        stage: String,
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' succeeded without producing {missing:?}")]
    #[diagnostic(
        code(curaflow::contract_violation),
        help("The task must report every declared output")
    )]
    ContractViolation { stage: String, missing: Vec<String> },

    #[error("Pipeline exceeded its deadline of {}s", .deadline.as_secs())]
    #[diagnostic(
        code(curaflow::timeout),
        help("Raise the workflow deadline or investigate the slow stage")
    )]
    Timeout { deadline: Duration },

    #[error("Task handle '{task}' is unknown to the launcher")]
    #[diagnostic(code(curaflow::unknown_task))]
    UnknownTask { task: String },

    #[error("Run '{run_id}' not found")]
    #[diagnostic(code(curaflow::run_not_found))]
    RunNotFound { run_id: String },

    #[error("Run '{run_id}' was aborted: {message}")]
    #[diagnostic(code(curaflow::run_aborted))]
    RunAborted { run_id: String, message: String },

    #[error("Run store error: {message}")]
    #[diagnostic(code(curaflow::store_error))]
    StoreError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(curaflow::pipeline_not_found),
        help("Create a pipeline with 'curaflow init' or write curaflow.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(curaflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(curaflow::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(curaflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(curaflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(curaflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(curaflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for CuraflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for CuraflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for CuraflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for CuraflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<reqwest::Error> for CuraflowError {
    fn from(e: reqwest::Error) -> Self {
        Self::SearchService { message: e.to_string() }
    }
}

impl CuraflowError {
    /// Whether this error was raised while validating a plan or submission,
    /// before any external side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingInput { .. }
                | Self::DuplicateStageName { .. }
                | Self::StageNotFound { .. }
                | Self::WorkflowNotFound { .. }
                | Self::UndeclaredOverwrite { .. }
                | Self::CircularDependency { .. }
                | Self::UnknownDependency { .. }
                | Self::InvalidStage { .. }
                | Self::InvalidContext { .. }
        )
    }

    /// Create a workflow-not-found error listing the known workflows
    pub fn workflow_not_found(workflow: &str, known: &[&str]) -> Self {
        let help = if known.is_empty() {
            Some("The pipeline definition declares no workflows".to_string())
        } else {
            Some(format!("Known workflows: {}", known.join(", ")))
        };

        Self::WorkflowNotFound {
            workflow: workflow.to_string(),
            help,
        }
    }

    /// Create a launch error with a hint derived from the launcher message
    pub fn launch_failed(stage: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let help = if message.contains("not found") || message.contains("No such file") {
            Some("The container reference could not be resolved by the launcher".to_string())
        } else if message.contains("ermission denied") {
            Some("The launcher is not allowed to start this task".to_string())
        } else {
            None
        };

        Self::LaunchError {
            stage: stage.to_string(),
            message,
            help,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        let missing = CuraflowError::MissingInput {
            stage: "inspect".into(),
            key: "S3OutputFirst".into(),
        };
        assert!(missing.is_validation());

        let timeout = CuraflowError::Timeout {
            deadline: Duration::from_secs(60),
        };
        assert!(!timeout.is_validation());
    }

    #[test]
    fn test_launch_failed_help() {
        let err = CuraflowError::launch_failed("curate", "program not found");
        match err {
            CuraflowError::LaunchError { help, .. } => assert!(help.is_some()),
            _ => panic!("Expected LaunchError"),
        }
    }

    #[test]
    fn test_workflow_not_found_lists_known() {
        let err = CuraflowError::workflow_not_found("nope", &["curation"]);
        match err {
            CuraflowError::WorkflowNotFound { help, .. } => {
                assert!(help.unwrap().contains("curation"));
            }
            _ => panic!("Expected WorkflowNotFound"),
        }
    }
}
