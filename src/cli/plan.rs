// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Plan command - compile a workflow without running it

use colored::Colorize;
use miette::Result;

use super::{report, OutputFormat, PlanArgs};
use crate::config::Settings;
use crate::errors::CuraflowResult;
use crate::pipeline::{ChainCompiler, Context, ExecutionPlan, PipelineDefinition, StageRegistry};
use crate::utils::{print_header, print_section};

/// Compile `workflow` against the keys of `context`
pub fn compile_plan(
    definition: &PipelineDefinition,
    workflow: &str,
    context: &Context,
) -> CuraflowResult<ExecutionPlan> {
    let registry = StageRegistry::from_definition(definition)?;
    ChainCompiler::new(&registry).compile_workflow(definition, workflow, &context.keys())
}

/// Machine-readable description of a plan
pub fn plan_document(plan: &ExecutionPlan) -> serde_json::Value {
    let stages: Vec<serde_json::Value> = plan
        .stages()
        .iter()
        .map(|stage| {
            serde_json::json!({
                "name": stage.name,
                "container": stage.container,
                "inputs": stage.inputs.keys().collect::<Vec<_>>(),
                "outputs": stage.outputs.keys().collect::<Vec<_>>(),
                "requires": stage.requires,
            })
        })
        .collect();

    serde_json::json!({
        "workflow": plan.workflow(),
        "fingerprint": plan.fingerprint(),
        "deadline_secs": plan.deadline().as_secs(),
        "resources": plan.required_resources(),
        "stages": stages,
    })
}

/// Run the plan command
pub async fn run(args: PlanArgs, settings: &Settings) -> Result<()> {
    let workflow = &args.submission.workflow;
    let (definition, context) = args.submission.prepare(settings).map_err(report)?;
    let plan = compile_plan(&definition, workflow, &context).map_err(report)?;

    match args.format {
        OutputFormat::Json => {
            let doc = serde_json::to_string_pretty(&plan_document(&plan))
                .map_err(|e| miette::miette!("Failed to serialize plan: {}", e))?;
            println!("{}", doc);
        }
        OutputFormat::Yaml => {
            let doc = serde_yaml::to_string(&plan_document(&plan))
                .map_err(|e| miette::miette!("Failed to serialize plan: {}", e))?;
            print!("{}", doc);
        }
        OutputFormat::Text => {
            print_header(&format!("Plan for workflow '{}'", plan.workflow()));
            println!("  Fingerprint: {}", plan.fingerprint().dimmed());
            println!("  Deadline: {}s", plan.deadline().as_secs());

            print_section("Stages");
            for (i, stage) in plan.stages().iter().enumerate() {
                println!("  {}. {} ({})", i + 1, stage.name.bold(), stage.container);
                for (key, env) in &stage.inputs {
                    println!("       {} {} {}", "in ".dimmed(), key, format!("as {}", env).dimmed());
                }
                for (key, env) in &stage.outputs {
                    println!("       {} {} {}", "out".dimmed(), key, format!("as {}", env).dimmed());
                }
            }

            if !plan.required_resources().is_empty() {
                print_section("Requires");
                for resource in plan.required_resources() {
                    println!("  - {}", resource);
                }
            }
        }
    }

    Ok(())
}
