// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for curaflow.

pub mod bootstrap;
pub mod graph;
pub mod init;
pub mod plan;
pub mod policy;
pub mod run;
pub mod status;
pub mod validate;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bootstrap::{HttpSearchIndex, SearchIndexService};
use crate::config::{LauncherKind, Settings};
use crate::errors::{CuraflowError, CuraflowResult, RecoverySuggestion};
use crate::launcher::{ProcessLauncher, SimulatedLauncher, TaskLauncher};
use crate::pipeline::{Context, PipelineDefinition};

/// Default pipeline definition file
pub const PIPELINE_FILE: &str = "curaflow.yaml";

/// Orchestrator for containerized data-curation pipelines
#[derive(Parser, Debug)]
#[clap(
    name = "curaflow",
    version,
    about = "Orchestrator for containerized data-curation pipelines",
    long_about = None,
    after_help = "Examples:\n\
        curaflow init                                   Write the built-in curation pipeline\n\
        curaflow bootstrap create                       Create the search index\n\
        curaflow run --set S3Input=s3://b/t.csv ...     Submit the curation workflow\n\
        curaflow status                                 List recorded runs\n\n\
        See 'curaflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Settings file (default: ./curaflow.toml, then the user config directory)
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL of the search service
    #[clap(long, global = true, env = "CURAFLOW_SEARCH_ENDPOINT", value_name = "URL")]
    pub search_endpoint: Option<String>,

    /// Launcher used to start stage tasks
    #[clap(long, global = true, env = "CURAFLOW_LAUNCHER", value_enum)]
    pub launcher: Option<LauncherKind>,

    /// Directory holding run records
    #[clap(long, global = true, env = "CURAFLOW_RUNS_DIR", value_name = "DIR")]
    pub runs_dir: Option<PathBuf>,
}

impl Cli {
    /// Settings from the settings file with flag and environment overrides
    pub fn settings(&self) -> CuraflowResult<Settings> {
        Ok(Settings::load(self.config.as_deref())?.with_overrides(
            self.search_endpoint.clone(),
            self.launcher,
            self.runs_dir.clone(),
        ))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the built-in curation pipeline to curaflow.yaml
    Init {
        /// Overwrite existing files
        #[clap(short, long)]
        force: bool,

        /// Rows drawn by each subsampling stage
        #[clap(long, default_value = "100")]
        num_rows: u32,

        /// Registry prefix of the stage images
        #[clap(long, default_value = "curaflow")]
        image_prefix: String,

        /// Name of the search index holding table descriptions
        #[clap(long, default_value = "table-descriptions")]
        index_name: String,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = PIPELINE_FILE)]
        pipeline: PathBuf,

        /// Also ask the configured launcher whether every container can start
        #[clap(long)]
        check_launcher: bool,
    },

    /// Show pipeline as a graph
    Graph {
        /// Pipeline file
        #[clap(default_value = PIPELINE_FILE)]
        pipeline: PathBuf,

        /// Only the stages of this workflow
        #[clap(short, long)]
        workflow: Option<String>,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Compile a workflow and show the execution plan without running it
    Plan(PlanArgs),

    /// Submit a workflow and wait for it to finish
    Run(RunArgs),

    /// Show a recorded run, or list all runs
    Status {
        /// Run id (omit to list runs)
        run_id: Option<String>,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Manage bootstrap resources (the search index)
    Bootstrap {
        /// Pipeline file
        #[clap(short, long, default_value = PIPELINE_FILE)]
        pipeline: PathBuf,

        #[clap(subcommand)]
        action: BootstrapAction,
    },

    /// Show the access policy
    Policy {
        /// Pipeline file
        #[clap(default_value = PIPELINE_FILE)]
        pipeline: PathBuf,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Workflow selection and initial context, shared by `plan` and `run`
#[derive(Args, Debug, Clone)]
pub struct SubmissionArgs {
    /// Workflow to compile
    #[clap(default_value = crate::pipeline::curation::WORKFLOW)]
    pub workflow: String,

    /// Pipeline file
    #[clap(short, long, default_value = PIPELINE_FILE)]
    pub pipeline: PathBuf,

    /// Initial context document (JSON or YAML object of strings)
    #[clap(long, value_name = "FILE")]
    pub context: Option<PathBuf>,

    /// Set an initial context value (repeatable)
    #[clap(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Override the workflow deadline, in seconds
    #[clap(long, value_name = "SECONDS")]
    pub deadline: Option<u64>,
}

impl SubmissionArgs {
    /// Definition with the deadline override applied, and the initial context
    pub fn prepare(&self, settings: &Settings) -> CuraflowResult<(PipelineDefinition, Context)> {
        let mut definition = load_definition(&self.pipeline, settings)?;
        if let Some(secs) = self.deadline {
            definition.deadline_secs = secs;
            if let Some(workflow) = definition.workflows.get_mut(&self.workflow) {
                workflow.deadline_secs = None;
            }
        }

        let context = build_context(self.context.as_deref(), &self.set)?;
        Ok((definition, context))
    }
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub submission: SubmissionArgs,

    /// Output format
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[clap(flatten)]
    pub submission: SubmissionArgs,

    /// Use the simulated launcher and an in-memory search index
    #[clap(long)]
    pub simulate: bool,
}

/// Bootstrap lifecycle actions
#[derive(Subcommand, Debug, Clone)]
pub enum BootstrapAction {
    /// Create the index (adopts an existing one)
    Create {
        /// Only this resource (default: all)
        #[clap(short, long)]
        resource: Option<String>,
    },

    /// Ensure the index exists
    Update {
        /// Only this resource (default: all)
        #[clap(short, long)]
        resource: Option<String>,
    },

    /// Delete the index (tolerates a missing one)
    Delete {
        /// Only this resource (default: all)
        #[clap(short, long)]
        resource: Option<String>,
    },

    /// Show the state of each resource
    Status,
}

/// Output format for structured commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Parse a `KEY=VALUE` pair
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Print a recovery suggestion for `err`, if any, and turn it into a report
pub fn report(err: CuraflowError) -> miette::Report {
    if let Some(suggestion) = RecoverySuggestion::for_error(&err) {
        eprintln!("{}", suggestion);
    }
    err.into()
}

/// Load a pipeline definition, applying the settings' deadline override
pub fn load_definition(path: &Path, settings: &Settings) -> CuraflowResult<PipelineDefinition> {
    let mut definition = PipelineDefinition::from_file(path)?;
    if let Some(secs) = settings.deadline_secs {
        definition.deadline_secs = secs;
    }
    Ok(definition)
}

/// Initial context from a document and `--set` pairs (pairs win)
pub fn build_context(file: Option<&Path>, pairs: &[(String, String)]) -> CuraflowResult<Context> {
    let base = match file {
        Some(path) => {
            let content =
                std::fs::read_to_string(path).map_err(|e| CuraflowError::FileReadError {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                })?;
            if path.extension().is_some_and(|ext| ext == "json") {
                Context::from_json(&content)?
            } else {
                Context::from_yaml(&content)?
            }
        }
        None => Context::new(),
    };

    Ok(base.merge(pairs.iter().cloned()))
}

/// Launcher for a launcher kind
pub fn create_launcher(kind: LauncherKind, settings: &Settings) -> CuraflowResult<Arc<dyn TaskLauncher>> {
    Ok(match kind {
        LauncherKind::Process => Arc::new(ProcessLauncher::new(std::env::current_dir()?)),
        LauncherKind::Simulated => Arc::new(SimulatedLauncher::new(settings.simulated_prefix.clone())),
    })
}

/// Search service client for the configured endpoint
pub fn search_index(settings: &Settings) -> CuraflowResult<Arc<dyn SearchIndexService>> {
    let endpoint = settings
        .search_endpoint
        .as_deref()
        .ok_or(CuraflowError::SearchEndpointMissing)?;
    Ok(Arc::new(HttpSearchIndex::new(endpoint)?))
}
