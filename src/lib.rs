// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! # curaflow - Data Curation Pipeline Orchestrator
//!
//! `curaflow` runs chains of containerized jobs over a shared key/value
//! context and bootstraps the search index those jobs depend on.
//!
//! ## Features
//!
//! - **Chain compilation** - Workflows are checked against the initial context before anything launches
//! - **Deadline-bound execution** - One global deadline per run, fail-fast on the first failing stage
//! - **Idempotent bootstrap** - Create/update/delete of the search index with a single-flight guard
//! - **Run records** - Every state transition is persisted and queryable by run id
//!
//! ## Quick Start
//!
//! ```bash
//! # Write the built-in five-stage curation pipeline
//! curaflow init
//!
//! # Create the search index
//! curaflow bootstrap create
//!
//! # Submit a table
//! curaflow run --set S3Input=s3://bucket/t.csv --set S3InputDQDL=s3://bucket/rules \
//!     --set TableName=orders
//!
//! # Inspect runs
//! curaflow status
//! ```

pub mod access;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod errors;
pub mod launcher;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use errors::{CuraflowError, CuraflowResult};
pub use pipeline::{Context, ExecutionPlan, PipelineDefinition, PipelineRun, RunId, RunStatus, StageDefinition};
pub use service::PipelineService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
