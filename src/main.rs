// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! curaflow - Data Curation Pipeline Orchestrator
//!
//! Compile, run and monitor containerized curation pipelines.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curaflow::cli::{Cli, Commands};
use curaflow::pipeline::curation::CurationOptions;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curaflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let settings = cli.settings()?;
    let verbose = cli.verbose;

    // Dispatch to command handlers
    match cli.command {
        Commands::Init {
            force,
            num_rows,
            image_prefix,
            index_name,
        } => {
            let defaults = CurationOptions::default();
            let options = CurationOptions {
                num_rows,
                image_prefix,
                index_name,
                search_endpoint: settings
                    .search_endpoint
                    .clone()
                    .unwrap_or(defaults.search_endpoint.clone()),
                ..defaults
            };
            curaflow::cli::init::run(force, options, verbose).await
        }
        Commands::Validate {
            pipeline,
            check_launcher,
        } => curaflow::cli::validate::run(pipeline, check_launcher, &settings, verbose).await,
        Commands::Graph {
            pipeline,
            workflow,
            format,
        } => curaflow::cli::graph::run(pipeline, workflow, format, &settings).await,
        Commands::Plan(args) => curaflow::cli::plan::run(args, &settings).await,
        Commands::Run(args) => curaflow::cli::run::run(args, &settings, verbose).await,
        Commands::Status { run_id, format } => {
            curaflow::cli::status::run(run_id, format, &settings).await
        }
        Commands::Bootstrap { pipeline, action } => {
            curaflow::cli::bootstrap::run(pipeline, action, &settings).await
        }
        Commands::Policy { pipeline, format } => {
            curaflow::cli::policy::run(pipeline, format, &settings).await
        }
    }
}
