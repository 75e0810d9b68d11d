// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Task launchers
//!
//! The executor never starts jobs itself; it hands a [`LaunchRequest`] to a
//! [`TaskLauncher`] and waits on the returned handle. Launchers decide what
//! a container reference means on their platform.

mod process;
mod simulated;

pub use process::ProcessLauncher;
pub use simulated::{SimulatedBehavior, SimulatedLauncher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::CuraflowResult;
use crate::pipeline::ComputeProfile;

/// Opaque identifier of a launched task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a launcher needs to start one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Stage the task belongs to (for logs and task naming)
    pub stage: String,
    /// Container reference
    pub container: String,
    /// Compute requirements
    pub compute: ComputeProfile,
    /// Environment injected into the task
    pub env: BTreeMap<String, String>,
    /// Environment names the task is expected to report back as outputs
    pub expected_outputs: Vec<String>,
}

/// Terminal status of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Task finished; `outputs` is keyed by environment variable name
    Succeeded { outputs: BTreeMap<String, String> },
    /// Task ran and failed
    Failed { cause: String },
    /// Task was cancelled before finishing
    Cancelled,
}

impl TaskOutcome {
    pub fn succeeded<I, K, V>(outputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Succeeded {
            outputs: outputs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Trait for task launchers
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Short name for logs ("process", "simulated", ...)
    fn name(&self) -> &str;

    /// Start a task
    ///
    /// An `Err` means the launcher refused or crashed; the task never ran.
    async fn launch(&self, request: LaunchRequest) -> CuraflowResult<TaskHandle>;

    /// Wait for a task to reach a terminal status
    async fn wait(&self, handle: &TaskHandle) -> CuraflowResult<TaskOutcome>;

    /// Request cancellation (best effort; the task may still complete)
    async fn cancel(&self, handle: &TaskHandle) -> CuraflowResult<()>;

    /// Check whether a container reference can be launched at all
    async fn check_available(&self, container: &str) -> CuraflowResult<bool>;
}

/// Prefix of stdout lines through which a task reports an output
pub const OUTPUT_LINE_PREFIX: &str = "::output ";

/// Environment variable listing the outputs a task should report
pub const EXPECTED_OUTPUTS_ENV: &str = "CURAFLOW_OUTPUTS";

/// Parse `::output NAME=value` lines out of task output
pub fn parse_output_lines(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| line.trim_end().strip_prefix(OUTPUT_LINE_PREFIX))
        .filter_map(|rest| rest.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}
