// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Pipeline definitions, compilation and execution
//!
//! This module defines the core data structures for curaflow pipelines:
//! the context threaded between stages, stage definitions and their
//! registry, the compiler producing execution plans, and the executor.

mod compiler;
mod context;
pub mod curation;
mod dag;
mod definition;
mod executor;
mod plan;
mod registry;
mod run;
mod validation;

pub use compiler::ChainCompiler;
pub use context::Context;
pub use dag::DagBuilder;
pub use definition::*;
pub use executor::{launch_request, PipelineExecutor};
pub use plan::ExecutionPlan;
pub use registry::StageRegistry;
pub use run::{
    AttemptOutcome, FailureKind, FailureReason, PipelineRun, RunId, RunStatus, StageAttempt,
};
pub use validation::{PipelineValidator, ValidationResult};
