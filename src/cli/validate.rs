// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{create_launcher, load_definition, report};
use crate::config::Settings;
use crate::pipeline::PipelineValidator;

/// Run the validate command
pub async fn run(
    pipeline_path: PathBuf,
    check_launcher: bool,
    settings: &Settings,
    verbose: bool,
) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let definition = match load_definition(&pipeline_path, settings) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("  {} Failed to load pipeline", "✗".red());
            eprintln!();
            return Err(report(e));
        }
    };

    println!("  {} Pipeline file is valid YAML", "✓".green());

    let validation = PipelineValidator::validate(&definition);

    let missing_containers = if check_launcher {
        let launcher = create_launcher(settings.launcher, settings)?;
        PipelineValidator::validate_launchable(&definition, launcher.as_ref()).await
    } else {
        Vec::new()
    };

    let mut has_issues = false;

    if !validation.errors.is_empty() {
        has_issues = true;
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if !missing_containers.is_empty() {
        has_issues = true;
        println!();
        println!("{}:", "Containers the launcher cannot start".yellow().bold());
        for container in &missing_containers {
            println!("  {} {}", "⚠".yellow(), container);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Name: {}", definition.name);
        println!("  Deadline: {}s", definition.deadline_secs);
        println!("  Stages: {}", definition.stages.len());
        for stage in &definition.stages {
            let requires = if stage.requires.is_empty() {
                String::new()
            } else {
                format!(" [requires: {}]", stage.requires.join(", "))
            };
            println!("    - {} ({}){}", stage.name, stage.container, requires.dimmed());
        }
        println!("  Workflows:");
        for (name, workflow) in &definition.workflows {
            println!("    - {}: {}", name, workflow.stages.join(" → "));
        }
    }

    println!();

    if has_issues {
        if validation.is_valid() && missing_containers.is_empty() {
            println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
            Ok(())
        } else {
            Err(miette::miette!("Pipeline validation failed"))
        }
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
        Ok(())
    }
}
