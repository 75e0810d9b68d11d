// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use crate::pipeline::{FailureKind, FailureReason};

use super::CuraflowError;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Pick a suggestion for an error, if one applies
    pub fn for_error(error: &CuraflowError) -> Option<Self> {
        match error {
            CuraflowError::MissingInput { stage, key } => Some(Self::supply_input(stage, key)),
            CuraflowError::ResourceNotReady { resource, .. } => {
                Some(Self::bootstrap_resource(resource))
            }
            CuraflowError::CircularDependency { stages } => {
                Some(Self::fix_circular_dependency(stages))
            }
            CuraflowError::PipelineNotFound { .. } => Some(Self::create_pipeline()),
            _ => None,
        }
    }

    /// Pick a suggestion for a failed run
    pub fn for_failure(reason: &FailureReason) -> Self {
        match &reason.kind {
            FailureKind::ContractViolation { missing } => Self {
                action: format!("Fix the output contract of stage '{}'", reason.stage),
                steps: vec![
                    format!("The task reported success but never produced: {}", missing.join(", ")),
                    "Make the task print one '::output NAME=value' line per declared output".into(),
                ],
                commands: vec![],
            },
            FailureKind::Launch => Self {
                action: format!("Check that stage '{}' can be launched", reason.stage),
                steps: vec![
                    "The launcher refused or crashed before the task ran".into(),
                    "Verify the container reference and the launcher configuration".into(),
                ],
                commands: vec!["curaflow validate --verbose".into()],
            },
            FailureKind::Task | FailureKind::Cancelled => Self {
                action: format!("Inspect the logs of stage '{}'", reason.stage),
                steps: vec![
                    "Earlier stages succeeded; their outputs are kept in the run record".into(),
                    "Re-submit a narrower workflow starting at the failed stage once fixed".into(),
                ],
                commands: vec!["curaflow status <RUN_ID>".into()],
            },
        }
    }

    /// Suggest supplying a missing context key
    pub fn supply_input(stage: &str, key: &str) -> Self {
        Self {
            action: format!("Provide context key '{}'", key),
            steps: vec![
                format!("Stage '{}' reads '{}' but nothing upstream produces it", stage, key),
                "Add it to the initial context document or reorder the workflow".into(),
            ],
            commands: vec![
                "# Pass a value on the command line:".into(),
                format!("curaflow run --set {}=<value>", key),
            ],
        }
    }

    /// Suggest bootstrapping a resource
    pub fn bootstrap_resource(resource: &str) -> Self {
        Self {
            action: format!("Bootstrap resource '{}'", resource),
            steps: vec![
                "Workflows using this resource are rejected until it is ready".into(),
                "Bootstrap is idempotent and safe to repeat on every deploy".into(),
            ],
            commands: vec![format!("curaflow bootstrap create --resource {}", resource)],
        }
    }

    /// Suggest fixing a deadline overrun
    pub fn extend_deadline(stage: Option<&str>) -> Self {
        let steps = match stage {
            Some(stage) => vec![
                format!("Stage '{}' was still running when the deadline passed", stage),
                "Its task was asked to cancel; it may still finish on the platform".into(),
            ],
            None => vec!["The deadline passed between stages".into()],
        };

        Self {
            action: "Raise the workflow deadline or speed up the slow stage".into(),
            steps,
            commands: vec!["curaflow run --deadline <SECONDS>".into()],
        }
    }

    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(stages: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", stages.join(" → ")),
                "Ensure 'depends_on' and produced keys form a directed acyclic graph".into(),
            ],
            commands: vec![
                "# Visualize the workflow:".into(),
                "curaflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest creating a pipeline file
    pub fn create_pipeline() -> Self {
        Self {
            action: "Create a pipeline definition".into(),
            steps: vec!["No curaflow.yaml found in the current directory".into()],
            commands: vec![
                "# Write the built-in curation chain:".into(),
                "curaflow init".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_for_missing_input() {
        let err = CuraflowError::MissingInput {
            stage: "curate".into(),
            key: "TableName".into(),
        };
        let suggestion = RecoverySuggestion::for_error(&err).unwrap();
        assert!(suggestion.to_string().contains("--set TableName"));
    }

    #[test]
    fn test_no_suggestion_for_io() {
        let err = CuraflowError::Io { message: "boom".into() };
        assert!(RecoverySuggestion::for_error(&err).is_none());
    }
}
