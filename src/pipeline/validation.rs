// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Pipeline validation
//!
//! Checks a whole pipeline definition before anything runs: every stage is
//! well formed, every workflow compiles against the inputs it declares, and
//! resources and access grants refer to things that exist.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::errors::CuraflowError;
use crate::launcher::TaskLauncher;
use crate::pipeline::{ChainCompiler, DagBuilder, PipelineDefinition, StageRegistry};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline definition
    pub fn validate(definition: &PipelineDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();

        if definition.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        if definition.deadline_secs == 0 {
            result.add_error("Pipeline deadline must be greater than zero");
        }

        // Report every duplicate, not only the first one registration hits
        let mut seen_names = HashSet::new();
        for stage in &definition.stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        for stage in &definition.stages {
            if let Err(e) = StageRegistry::check_definition(stage) {
                result.add_error(&e.to_string());
            }
        }

        let declared: BTreeSet<&str> = definition.resources.iter().map(|r| r.name.as_str()).collect();
        let mut required = BTreeSet::new();
        for stage in &definition.stages {
            for resource in &stage.requires {
                required.insert(resource.as_str());
                if !declared.contains(resource.as_str()) {
                    result.add_error(&format!(
                        "Stage '{}' requires undeclared resource '{}'",
                        stage.name, resource
                    ));
                }
            }
        }
        for resource in declared.difference(&required) {
            result.add_warning(&format!("Resource '{}' is not required by any stage", resource));
        }

        // Structural graph over all stages (explicit dependencies, cycles)
        let all: Vec<_> = definition.stages.iter().cloned().map(Arc::new).collect();
        match DagBuilder::build(&all) {
            Ok(_) => {}
            Err(CuraflowError::CircularDependency { stages }) => {
                result.add_error(&format!("Circular dependency: {}", stages.join(" → ")));
            }
            Err(e) => result.add_error(&e.to_string()),
        }

        Self::validate_workflows(definition, &mut result);
        Self::validate_access(definition, &mut result);

        result
    }

    fn validate_workflows(definition: &PipelineDefinition, result: &mut ValidationResult) {
        if definition.workflows.is_empty() {
            result.add_warning("Pipeline declares no workflows; nothing can be submitted");
            return;
        }

        // Registration errors were reported above; compile what registers
        let mut registry = StageRegistry::new();
        for stage in &definition.stages {
            let _ = registry.register(stage.clone());
        }
        let compiler = ChainCompiler::new(&registry);

        let mut used = HashSet::new();
        for (name, workflow) in &definition.workflows {
            if workflow.stages.is_empty() {
                result.add_error(&format!("Workflow '{}' has no stages", name));
                continue;
            }
            if workflow.deadline_secs == Some(0) {
                result.add_error(&format!("Workflow '{}' has a zero deadline", name));
            }

            used.extend(workflow.stages.iter().map(String::as_str));

            let inputs: BTreeSet<String> = workflow.inputs.iter().cloned().collect();
            if let Err(e) = compiler.compile_workflow(definition, name, &inputs) {
                result.add_error(&format!("Workflow '{}': {}", name, e));
            }
        }

        for stage in &definition.stages {
            if !used.contains(stage.name.as_str()) {
                result.add_warning(&format!("Stage '{}' is not part of any workflow", stage.name));
            }
        }
    }

    fn validate_access(definition: &PipelineDefinition, result: &mut ValidationResult) {
        let Some(policy) = &definition.access else {
            return;
        };

        let stages = definition.stages.iter().map(|s| s.name.as_str());
        for stage in policy.unknown_stage_principals(stages) {
            result.add_error(&format!("Access policy grants to unknown stage '{}'", stage));
        }
    }

    /// Containers the launcher reports it cannot start
    pub async fn validate_launchable(
        definition: &PipelineDefinition,
        launcher: &dyn TaskLauncher,
    ) -> Vec<String> {
        let mut missing = Vec::new();
        let containers: BTreeSet<&str> =
            definition.stages.iter().map(|s| s.container.as_str()).collect();

        for container in containers {
            match launcher.check_available(container).await {
                Ok(true) => {}
                Ok(false) | Err(_) => missing.push(container.to_string()),
            }
        }

        missing
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessPolicy;
    use crate::launcher::SimulatedLauncher;
    use crate::pipeline::{curation, StageDefinition};

    #[test]
    fn test_builtin_chain_is_valid() {
        let result = PipelineValidator::validate(&curation::definition());
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(!result.has_warnings(), "{:?}", result.warnings);
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let definition = PipelineDefinition::from_yaml("name: empty\nstages: []\n").unwrap();

        let result = PipelineValidator::validate(&definition);
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
        assert!(result.warnings.iter().any(|w| w.contains("no workflows")));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let mut definition = curation::definition();
        definition.stages.push(StageDefinition::new("inspect", "other:latest"));

        let result = PipelineValidator::validate(&definition);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_workflow_missing_input() {
        let mut definition = curation::definition();
        if let Some(workflow) = definition.workflows.get_mut(curation::WORKFLOW) {
            workflow.inputs.retain(|k| k != "TableName");
        }

        let result = PipelineValidator::validate(&definition);
        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.starts_with("Workflow 'curation'") && e.contains("TableName")));
    }

    #[test]
    fn test_undeclared_resource_and_unused_stage() {
        let mut definition = curation::definition();
        definition.resources.clear();
        definition
            .stages
            .push(StageDefinition::new("orphan", "orphan:latest"));

        let result = PipelineValidator::validate(&definition);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("undeclared resource 'search-index'")));
        assert!(result.warnings.iter().any(|w| w.contains("'orphan'")));
    }

    #[test]
    fn test_access_policy_names_unknown_stage() {
        let mut definition = curation::definition();
        definition.access = Some(AccessPolicy::new().grant("stage:ghost", "data-bucket", ["read"]));

        let result = PipelineValidator::validate(&definition);
        assert!(result.errors.iter().any(|e| e.contains("'ghost'")));
    }

    #[test]
    fn test_cycle_through_depends_on() {
        let mut definition = curation::definition();
        if let Some(first) = definition.stages.iter_mut().find(|s| s.name == "subsample-first") {
            first.depends_on.push("curate".into());
        }

        let result = PipelineValidator::validate(&definition);
        assert!(result.errors.iter().any(|e| e.starts_with("Circular dependency")));
    }

    #[tokio::test]
    async fn test_simulated_launcher_can_start_everything() {
        let launcher = SimulatedLauncher::default();
        let missing = PipelineValidator::validate_launchable(&curation::definition(), &launcher).await;
        assert!(missing.is_empty());
    }
}
