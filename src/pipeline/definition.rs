// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for curaflow.yaml files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::access::AccessPolicy;
use crate::errors::{CuraflowError, CuraflowResult};

/// Default global deadline for a workflow, in seconds
pub const DEFAULT_DEADLINE_SECS: u64 = 30 * 60;

/// Pipeline definition from curaflow.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Definition version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Deadline applied to workflows that don't set their own
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Every stage that may appear in a workflow
    pub stages: Vec<StageDefinition>,

    /// Named stage orderings that callers can submit
    #[serde(default)]
    pub workflows: BTreeMap<String, Workflow>,

    /// Resources that must be bootstrapped before dependent stages run
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,

    /// Who may act on which resource
    #[serde(default)]
    pub access: Option<AccessPolicy>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_deadline_secs() -> u64 {
    DEFAULT_DEADLINE_SECS
}

impl PipelineDefinition {
    /// Load a definition from a YAML file
    pub fn from_file(path: &Path) -> CuraflowResult<Self> {
        if !path.exists() {
            return Err(CuraflowError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| CuraflowError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        Self::from_yaml(&content)
    }

    /// Parse a definition from a YAML string
    pub fn from_yaml(yaml: &str) -> CuraflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize the definition to YAML
    pub fn to_yaml(&self) -> CuraflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Get a workflow by name
    pub fn workflow(&self, name: &str) -> CuraflowResult<&Workflow> {
        self.workflows.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
            CuraflowError::workflow_not_found(name, &known)
        })
    }

    /// Get a resource by name
    pub fn resource(&self, name: &str) -> Option<&ResourceDefinition> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Deadline for a workflow, falling back to the pipeline default
    pub fn deadline_for(&self, workflow: &Workflow) -> Duration {
        Duration::from_secs(workflow.deadline_secs.unwrap_or(self.deadline_secs))
    }

    /// Access policy, or the policy derived from the declared stages
    pub fn access_policy(&self) -> AccessPolicy {
        self.access
            .clone()
            .unwrap_or_else(|| AccessPolicy::derived_from(self))
    }
}

/// A named ordering of stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow description
    #[serde(default)]
    pub description: Option<String>,

    /// Stage names in the order they run
    pub stages: Vec<String>,

    /// Context keys the caller is expected to supply
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Overrides the pipeline-wide deadline
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

/// Immutable descriptor of one containerized job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stage name (unique within the pipeline)
    pub name: String,

    /// Stage description
    #[serde(default)]
    pub description: Option<String>,

    /// Container reference handed to the launcher
    pub container: String,

    /// Compute requirements
    #[serde(default)]
    pub compute: ComputeProfile,

    /// Required context key -> environment variable name
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    /// Produced context key -> environment variable name
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Output keys this stage may rewrite after an earlier stage produced them
    #[serde(default)]
    pub overwrites: Vec<String>,

    /// Static launch parameters, environment variable name -> value
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Bootstrap resources that must be ready before this stage runs
    #[serde(default)]
    pub requires: Vec<String>,

    /// Explicit predecessors, on top of those implied by context keys
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StageDefinition {
    /// Start a definition with default compute and no bindings
    pub fn new(name: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            container: container.into(),
            compute: ComputeProfile::default(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            overwrites: Vec::new(),
            params: BTreeMap::new(),
            requires: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Bind a required context key to an environment variable
    #[must_use]
    pub fn input(mut self, key: impl Into<String>, env: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), env.into());
        self
    }

    /// Bind a produced context key to an environment variable
    #[must_use]
    pub fn output(mut self, key: impl Into<String>, env: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), env.into());
        self
    }

    /// Add a static launch parameter
    #[must_use]
    pub fn param(mut self, env: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(env.into(), value.into());
        self
    }

    /// Require a bootstrap resource
    #[must_use]
    pub fn requires(mut self, resource: impl Into<String>) -> Self {
        self.requires.push(resource.into());
        self
    }

    /// Declare an output key this stage may overwrite
    #[must_use]
    pub fn overwrites(mut self, key: impl Into<String>) -> Self {
        self.overwrites.push(key.into());
        self
    }

    #[must_use]
    pub fn with_compute(mut self, compute: ComputeProfile) -> Self {
        self.compute = compute;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the stage may overwrite `key`
    pub fn may_overwrite(&self, key: &str) -> bool {
        self.overwrites.iter().any(|k| k == key)
    }

    /// Context key bound to an output environment variable
    pub fn output_key_for_env(&self, env: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(_, name)| name.as_str() == env)
            .map(|(key, _)| key.as_str())
    }
}

/// Compute profile for a stage
///
/// CPU is in platform units where 1024 is one vCPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeProfile {
    pub cpu: u32,
    pub memory_mib: u32,
    pub ephemeral_storage_gib: u32,
}

impl Default for ComputeProfile {
    fn default() -> Self {
        Self {
            cpu: 1024,
            memory_mib: 4096,
            ephemeral_storage_gib: 21,
        }
    }
}

impl std::fmt::Display for ComputeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cpu, {} MiB, {} GiB",
            self.cpu, self.memory_mib, self.ephemeral_storage_gib
        )
    }
}

/// A bootstrap resource (a search index)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Identity used in `requires` lists
    pub name: String,

    /// Name of the index on the search service
    pub index: String,

    /// Vector dimension of the embedding field
    #[serde(default = "default_dimension")]
    pub dimension: u32,
}

fn default_dimension() -> u32 {
    1536
}
