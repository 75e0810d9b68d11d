// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Chain compiler
//!
//! Turns a requested stage ordering into an [`ExecutionPlan`] by walking the
//! stages with the set of context keys available at each point. Nothing is
//! launched here; every error is a validation error.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{CuraflowError, CuraflowResult};
use crate::pipeline::{DagBuilder, ExecutionPlan, PipelineDefinition, StageDefinition, StageRegistry};

/// Where a key in the running available set came from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Initial,
    Stage(String),
}

/// Compiles stage orderings against a registry
pub struct ChainCompiler<'a> {
    registry: &'a StageRegistry,
}

impl<'a> ChainCompiler<'a> {
    pub fn new(registry: &'a StageRegistry) -> Self {
        Self { registry }
    }

    /// Compile a fixed stage order
    pub fn compile<S: AsRef<str>>(
        &self,
        workflow: &str,
        order: &[S],
        initial_keys: &BTreeSet<String>,
        deadline: Duration,
    ) -> CuraflowResult<ExecutionPlan> {
        let stages = self.resolve(order)?;
        check_dataflow(&stages, initial_keys)?;

        tracing::debug!(workflow, stages = stages.len(), "compiled linear plan");
        Ok(ExecutionPlan::new(workflow, stages, deadline))
    }

    /// Compile a set of stages whose order is derived from their dependencies
    pub fn compile_graph<S: AsRef<str>>(
        &self,
        workflow: &str,
        stage_names: &[S],
        initial_keys: &BTreeSet<String>,
        deadline: Duration,
    ) -> CuraflowResult<ExecutionPlan> {
        let stages = self.resolve(stage_names)?;
        let ordered = DagBuilder::build(&stages)?.topological_order()?;
        check_dataflow(&ordered, initial_keys)?;

        tracing::debug!(workflow, stages = ordered.len(), "compiled graph plan");
        Ok(ExecutionPlan::new(workflow, ordered, deadline))
    }

    /// Compile a named workflow of a pipeline definition
    pub fn compile_workflow(
        &self,
        definition: &PipelineDefinition,
        workflow: &str,
        initial_keys: &BTreeSet<String>,
    ) -> CuraflowResult<ExecutionPlan> {
        let selected = definition.workflow(workflow)?;
        self.compile(
            workflow,
            &selected.stages,
            initial_keys,
            definition.deadline_for(selected),
        )
    }

    fn resolve<S: AsRef<str>>(&self, names: &[S]) -> CuraflowResult<Vec<Arc<StageDefinition>>> {
        let mut seen = HashSet::new();
        let mut stages = Vec::with_capacity(names.len());

        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(CuraflowError::DuplicateStageName {
                    name: name.to_string(),
                });
            }
            stages.push(self.registry.lookup(name)?);
        }

        Ok(stages)
    }
}

/// Forward dataflow check over an ordered list of stages
fn check_dataflow(
    stages: &[Arc<StageDefinition>],
    initial_keys: &BTreeSet<String>,
) -> CuraflowResult<()> {
    let mut available: HashMap<&str, Origin> = initial_keys
        .iter()
        .map(|k| (k.as_str(), Origin::Initial))
        .collect();

    for stage in stages {
        for key in stage.inputs.keys() {
            if !available.contains_key(key.as_str()) {
                return Err(CuraflowError::MissingInput {
                    stage: stage.name.clone(),
                    key: key.clone(),
                });
            }
        }

        for key in stage.outputs.keys() {
            if let Some(Origin::Stage(producer)) = available.get(key.as_str()) {
                if !stage.may_overwrite(key) {
                    return Err(CuraflowError::UndeclaredOverwrite {
                        stage: stage.name.clone(),
                        key: key.clone(),
                        producer: producer.clone(),
                    });
                }
            }
            available.insert(key.as_str(), Origin::Stage(stage.name.clone()));
        }
    }

    Ok(())
}
