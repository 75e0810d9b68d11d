// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Progress spinner utilities
//!
//! Provides progress indicators for long-running operations.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::pipeline::{PipelineRun, RunStatus};

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Spinner message describing where a run is
pub fn run_progress_message(run: &PipelineRun) -> String {
    match &run.status {
        RunStatus::Running { stage, index } => {
            format!("[{}/{}] {}", index + 1, run.stages.len(), stage)
        }
        RunStatus::Pending => format!("[0/{}] waiting to start", run.stages.len()),
        other => other.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{curation, ChainCompiler, RunId, StageRegistry};

    #[test]
    fn test_run_progress_message() {
        let definition = curation::definition();
        let registry = StageRegistry::from_definition(&definition).unwrap();
        let context = curation::initial_context("a", "b", "c");
        let plan = ChainCompiler::new(&registry)
            .compile_workflow(&definition, curation::WORKFLOW, &context.keys())
            .unwrap();

        let mut run = PipelineRun::new(RunId::new(), &plan, context);
        assert_eq!(run_progress_message(&run), "[0/5] waiting to start");

        run.start_stage(2, "inspect");
        assert_eq!(run_progress_message(&run), "[3/5] inspect");
    }
}
