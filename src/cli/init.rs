// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Init command - write the built-in curation pipeline

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::PIPELINE_FILE;
use crate::config::{Settings, SETTINGS_FILE};
use crate::errors::{CuraflowError, CuraflowResult};
use crate::pipeline::curation::{self, CurationOptions};

/// Run the init command
pub async fn run(force: bool, options: CurationOptions, verbose: bool) -> Result<()> {
    println!("{}", "Initializing curaflow project...".bold());
    println!();

    if Path::new(PIPELINE_FILE).exists() && !force {
        return Err(miette::miette!(
            "{} already exists. Use --force to overwrite.",
            PIPELINE_FILE
        ));
    }

    let definition = curation::definition_with(&options);
    let pipeline_content = format!(
        "# curaflow pipeline: {}\n# Submit with: curaflow run {} --set S3Input=... --set S3InputDQDL=... --set TableName=...\n\n{}",
        definition.name,
        curation::WORKFLOW,
        definition.to_yaml()?
    );

    write_file(PIPELINE_FILE, &pipeline_content)?;
    println!("  {} Created {}", "✓".green(), PIPELINE_FILE);

    if !Path::new(SETTINGS_FILE).exists() || force {
        let settings = Settings {
            search_endpoint: Some(options.search_endpoint.clone()),
            ..Settings::default()
        };
        write_file(SETTINGS_FILE, &settings.to_toml()?)?;
        println!("  {} Created {}", "✓".green(), SETTINGS_FILE);
    }

    println!();
    println!("{}", "Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Point {} at your search service", SETTINGS_FILE.cyan());
    println!("  2. Run {} to create the index", "curaflow bootstrap create".cyan());
    println!("  3. Run {} to submit a table", "curaflow run --set ...".cyan());
    println!();

    if verbose {
        println!("{}", "Generated pipeline:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", pipeline_content.dimmed());
    }

    Ok(())
}

fn write_file(path: &str, content: &str) -> CuraflowResult<()> {
    std::fs::write(path, content).map_err(|e| CuraflowError::FileWriteError {
        path: path.into(),
        error: e.to_string(),
    })
}
