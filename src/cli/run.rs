// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Run command - submit a workflow and follow it to completion

use colored::Colorize;
use miette::Result;
use std::sync::Arc;
use std::time::Duration;

use super::plan::compile_plan;
use super::{create_launcher, report, search_index, RunArgs};
use crate::bootstrap::{BootstrapEvent, BootstrapHandler, BootstrapOutcome, InMemorySearchIndex};
use crate::config::{LauncherKind, Settings};
use crate::errors::{CuraflowError, RecoverySuggestion};
use crate::pipeline::{
    ExecutionPlan, FailureKind, PipelineDefinition, PipelineRun, PipelineValidator, RunStatus,
};
use crate::service::PipelineService;
use crate::store::{FilesystemRunStore, RunStore};
use crate::utils::{attempt_marker, create_spinner, print_section, run_progress_message, run_status};

/// Run the pipeline
pub async fn run(args: RunArgs, settings: &Settings, verbose: bool) -> Result<()> {
    let (definition, context) = args.submission.prepare(settings).map_err(report)?;

    let validation = PipelineValidator::validate(&definition);
    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    // Compile before touching the launcher or the search service
    let plan = compile_plan(&definition, &args.submission.workflow, &context).map_err(report)?;

    let kind = if args.simulate {
        LauncherKind::Simulated
    } else {
        settings.launcher
    };
    let launcher = create_launcher(kind, settings)?;
    let store: Arc<dyn RunStore> = Arc::new(FilesystemRunStore::new(settings.runs_dir.clone())?);
    let bootstrap = prepare_bootstrap(&definition, &plan, args.simulate, settings).await?;

    let service = PipelineService::new(definition, launcher, store, bootstrap)?;
    let id = service.submit_plan(plan, context).await.map_err(report)?;

    println!("{} {}", "Submitted run".bold(), id.to_string().cyan());

    let spinner = create_spinner("starting");
    let wait = service.wait(id);
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    let run = loop {
        tokio::select! {
            result = &mut wait => break result,
            _ = ticker.tick() => {
                if let Ok(run) = service.status(id).await {
                    spinner.set_message(run_progress_message(&run));
                }
            }
        }
    };
    spinner.finish_and_clear();
    let run = run?;

    print_summary(&run);

    match &run.status {
        RunStatus::Succeeded => {
            println!();
            println!("{}", "Run succeeded!".green().bold());
            Ok(())
        }
        RunStatus::Failed { reason } => {
            eprintln!();
            eprintln!("{}", RecoverySuggestion::for_failure(reason));
            Err(match &reason.kind {
                FailureKind::ContractViolation { missing } => CuraflowError::ContractViolation {
                    stage: reason.stage.clone(),
                    missing: missing.clone(),
                }
                .into(),
                FailureKind::Launch => {
                    CuraflowError::launch_failed(&reason.stage, reason.message.clone()).into()
                }
                FailureKind::Task | FailureKind::Cancelled => {
                    miette::miette!("Run {} failed: {}", id, reason)
                }
            })
        }
        RunStatus::TimedOut { stage } => {
            eprintln!();
            eprintln!("{}", RecoverySuggestion::extend_deadline(stage.as_deref()));
            Err(CuraflowError::Timeout {
                deadline: Duration::from_secs(run.deadline_secs),
            }
            .into())
        }
        other => Err(miette::miette!("Run {} ended as {}", id, other)),
    }
}

/// Search index handler for the resources `plan` needs
///
/// `--simulate` bootstraps an in-memory index on the spot; otherwise the
/// current state is read from the search service and nothing is created.
async fn prepare_bootstrap(
    definition: &PipelineDefinition,
    plan: &ExecutionPlan,
    simulate: bool,
    settings: &Settings,
) -> Result<BootstrapHandler> {
    if plan.required_resources().is_empty() {
        return Ok(BootstrapHandler::new(
            Arc::new(InMemorySearchIndex::new()),
            &definition.resources,
        ));
    }

    if simulate {
        let handler =
            BootstrapHandler::new(Arc::new(InMemorySearchIndex::new()), &definition.resources);
        for resource in plan.required_resources() {
            if let BootstrapOutcome::Failure { message } =
                handler.apply(resource, BootstrapEvent::Create).await?
            {
                return Err(miette::miette!("Simulated bootstrap of '{}' failed: {}", resource, message));
            }
        }
        return Ok(handler);
    }

    let handler = BootstrapHandler::new(search_index(settings).map_err(report)?, &definition.resources);
    handler.refresh().await.map_err(report)?;
    Ok(handler)
}

fn print_summary(run: &PipelineRun) {
    print_section("Stages");
    for stage in &run.stages {
        match run.attempts.iter().find(|a| &a.stage == stage) {
            Some(attempt) => {
                let task = attempt
                    .task
                    .as_deref()
                    .map(|t| format!(" ({})", t))
                    .unwrap_or_default();
                println!("  {} {}{}", attempt_marker(&attempt.outcome), stage, task.dimmed());
            }
            None => println!("  {} {}", "○".dimmed(), stage.dimmed()),
        }
    }

    print_section("Context");
    for (key, value) in run.context.iter() {
        let value = if value.is_empty() { "(empty)" } else { value };
        println!("  {} = {}", key, value);
    }

    println!();
    println!("  Status: {}", run_status(&run.status));
}
