// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Status command - inspect recorded runs

use colored::Colorize;
use miette::Result;

use super::OutputFormat;
use crate::config::Settings;
use crate::errors::CuraflowError;
use crate::pipeline::{PipelineRun, RunId, RunStatus};
use crate::store::{FilesystemRunStore, RunStore};
use crate::utils::{attempt_marker, print_header, print_section, run_status};

/// Run the status command
pub async fn run(run_id: Option<String>, format: OutputFormat, settings: &Settings) -> Result<()> {
    let store = FilesystemRunStore::new(settings.runs_dir.clone())?;

    match run_id {
        Some(raw) => {
            let id = RunId::parse(&raw)
                .ok_or_else(|| miette::miette!("'{}' is not a valid run id", raw))?;
            let run = store
                .load(id)
                .await?
                .ok_or_else(|| CuraflowError::RunNotFound { run_id: raw.clone() })?;
            show_run(&run, format)
        }
        None => {
            let runs = store.list().await?;
            list_runs(&runs, format)
        }
    }
}

fn show_run(run: &PipelineRun, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let doc = serde_json::to_string_pretty(run)
                .map_err(|e| miette::miette!("Failed to serialize run: {}", e))?;
            println!("{}", doc);
        }
        OutputFormat::Yaml => {
            let doc = serde_yaml::to_string(run)
                .map_err(|e| miette::miette!("Failed to serialize run: {}", e))?;
            print!("{}", doc);
        }
        OutputFormat::Text => {
            print_header(&format!("Run {}", run.id));
            println!("  Workflow:  {}", run.workflow);
            println!("  Plan:      {}", run.plan.dimmed());
            println!("  Status:    {}", run_status(&run.status));
            println!("  Submitted: {}", run.submitted_at.to_rfc3339());
            if let Some(finished) = run.finished_at {
                println!("  Finished:  {}", finished.to_rfc3339());
            }

            match &run.status {
                RunStatus::Failed { reason } => println!("  Reason:    {}", reason.to_string().red()),
                RunStatus::TimedOut { stage: Some(stage) } => {
                    println!("  Reason:    deadline passed while '{}' was running", stage)
                }
                _ => {}
            }

            print_section("Stages");
            for stage in &run.stages {
                match run.attempts.iter().find(|a| &a.stage == stage) {
                    Some(attempt) => println!("  {} {}", attempt_marker(&attempt.outcome), stage),
                    None => println!("  {} {}", "○".dimmed(), stage.dimmed()),
                }
            }

            print_section("Context");
            for (key, value) in run.context.iter() {
                println!("  {} = {}", key, value);
            }
        }
    }

    Ok(())
}

fn list_runs(runs: &[PipelineRun], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let doc = serde_json::to_string_pretty(runs)
                .map_err(|e| miette::miette!("Failed to serialize runs: {}", e))?;
            println!("{}", doc);
        }
        OutputFormat::Yaml => {
            let doc = serde_yaml::to_string(runs)
                .map_err(|e| miette::miette!("Failed to serialize runs: {}", e))?;
            print!("{}", doc);
        }
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No runs recorded");
                return Ok(());
            }

            for run in runs {
                println!(
                    "{}  {:<14} {:<10} {}",
                    run.id,
                    run.workflow,
                    run_status(&run.status),
                    run.submitted_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
                );
            }
        }
    }

    Ok(())
}
