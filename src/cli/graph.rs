// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Graph command - visualize pipeline as a graph

use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_definition, report, GraphFormat};
use crate::config::Settings;
use crate::pipeline::{ChainCompiler, DagBuilder, StageRegistry};

/// Run the graph command
pub async fn run(
    pipeline_path: PathBuf,
    workflow: Option<String>,
    format: GraphFormat,
    settings: &Settings,
) -> Result<()> {
    let definition = load_definition(&pipeline_path, settings).map_err(report)?;

    let stages = match workflow {
        Some(name) => {
            let registry = StageRegistry::from_definition(&definition)?;
            let selected = definition.workflow(&name)?;
            // Declared inputs stand in for the caller's context
            let inputs = selected.inputs.iter().cloned().collect();
            ChainCompiler::new(&registry)
                .compile_workflow(&definition, &name, &inputs)
                .map_err(report)?
                .stages()
                .to_vec()
        }
        None => definition.stages.iter().cloned().map(Arc::new).collect(),
    };

    let dag = DagBuilder::build(&stages).map_err(report)?;

    let output = match format {
        GraphFormat::Text => dag.to_text()?,
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
