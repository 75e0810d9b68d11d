// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Stage definition registry
//!
//! Populated once when the pipeline definition is loaded and read-only
//! afterwards; plans hold `Arc`s into it.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use crate::errors::{CuraflowError, CuraflowResult};
use crate::pipeline::{PipelineDefinition, StageDefinition};

fn env_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid env name pattern"))
}

/// Registry of stage definitions keyed by name
#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    stages: BTreeMap<String, Arc<StageDefinition>>,
}

impl StageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every stage of a pipeline definition
    pub fn from_definition(definition: &PipelineDefinition) -> CuraflowResult<Self> {
        let mut registry = Self::new();
        for stage in &definition.stages {
            registry.register(stage.clone())?;
        }
        Ok(registry)
    }

    /// Register a stage definition
    pub fn register(&mut self, definition: StageDefinition) -> CuraflowResult<()> {
        if self.stages.contains_key(&definition.name) {
            return Err(CuraflowError::DuplicateStageName {
                name: definition.name,
            });
        }

        Self::check_definition(&definition)?;

        tracing::debug!(stage = %definition.name, "registered stage");
        self.stages
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Look up a stage by name
    pub fn lookup(&self, name: &str) -> CuraflowResult<Arc<StageDefinition>> {
        self.stages
            .get(name)
            .cloned()
            .ok_or_else(|| CuraflowError::StageNotFound {
                stage: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Registered stage names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.stages.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Structural checks on a single definition
    pub(crate) fn check_definition(stage: &StageDefinition) -> CuraflowResult<()> {
        let invalid = |reason: String| CuraflowError::InvalidStage {
            stage: stage.name.clone(),
            reason,
        };

        if stage.name.trim().is_empty() {
            return Err(invalid("stage name is empty".into()));
        }

        if stage.container.trim().is_empty() {
            return Err(invalid("container reference is empty".into()));
        }

        if stage.compute.cpu == 0 || stage.compute.memory_mib == 0 {
            return Err(invalid("compute profile needs non-zero cpu and memory".into()));
        }

        // Each environment variable may be bound once per stage
        let mut seen = HashSet::new();
        let env_names = stage
            .inputs
            .values()
            .chain(stage.outputs.values())
            .chain(stage.params.keys());

        for env in env_names {
            if !env_name_pattern().is_match(env) {
                return Err(invalid(format!("'{}' is not a valid environment variable name", env)));
            }
            if !seen.insert(env.as_str()) {
                return Err(invalid(format!("environment variable '{}' is bound twice", env)));
            }
        }

        for key in &stage.overwrites {
            if !stage.outputs.contains_key(key) {
                return Err(invalid(format!(
                    "'{}' is listed in overwrites but is not an output",
                    key
                )));
            }
        }

        Ok(())
    }
}
