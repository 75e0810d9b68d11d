// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Pipeline run records
//!
//! A [`PipelineRun`] is everything observable about one execution of a plan.
//! The executor owns the record while the run is live and writes a copy to
//! the run store on every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::pipeline::{Context, ExecutionPlan};

/// Identifier of a submitted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a stage failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The launcher refused or crashed; the task never ran
    Launch,
    /// The task ran and reported failure
    Task,
    /// The task was cancelled by someone other than the deadline
    Cancelled,
    /// The task succeeded without reporting every declared output
    ContractViolation { missing: Vec<String> },
}

/// Failure descriptor of a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub stage: String,
    #[serde(flatten)]
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FailureKind::Launch => "launch error",
            FailureKind::Task => "task failed",
            FailureKind::Cancelled => "cancelled",
            FailureKind::ContractViolation { .. } => "contract violation",
        };
        write!(f, "stage '{}' {}: {}", self.stage, kind, self.message)
    }
}

/// Status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running { stage: String, index: usize },
    Succeeded,
    Failed { reason: FailureReason },
    TimedOut { stage: Option<String> },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::TimedOut { .. }
        )
    }

    /// Short label for tables and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running { .. } => "running",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed-out",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running { stage, .. } => write!(f, "running({})", stage),
            Self::Failed { reason } => write!(f, "failed[{}]", reason),
            Self::TimedOut { stage: Some(stage) } => write!(f, "timed-out during '{}'", stage),
            other => f.write_str(other.label()),
        }
    }
}

/// How a single stage attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// One stage attempt within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAttempt {
    pub stage: String,
    #[serde(default)]
    pub task: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: AttemptOutcome,
}

/// One execution of a compiled plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub workflow: String,
    /// Fingerprint of the plan this run executes
    pub plan: String,
    pub stages: Vec<String>,
    pub deadline_secs: u64,
    pub status: RunStatus,
    /// Latest context: the final context on success, or the context left by
    /// the stages that succeeded before a failure
    pub context: Context,
    #[serde(default)]
    pub attempts: Vec<StageAttempt>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// New pending run of `plan` seeded with `context`
    pub fn new(id: RunId, plan: &ExecutionPlan, context: Context) -> Self {
        Self {
            id,
            workflow: plan.workflow().to_string(),
            plan: plan.fingerprint().to_string(),
            stages: plan.stage_names().into_iter().map(String::from).collect(),
            deadline_secs: plan.deadline().as_secs(),
            status: RunStatus::Pending,
            context,
            attempts: Vec::new(),
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Index of the stage currently running
    pub fn cursor(&self) -> Option<usize> {
        match self.status {
            RunStatus::Running { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stages that completed successfully, in order
    pub fn completed_stages(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Succeeded)
            .map(|a| a.stage.as_str())
            .collect()
    }

    pub(crate) fn start_stage(&mut self, index: usize, stage: &str) {
        self.status = RunStatus::Running {
            stage: stage.to_string(),
            index,
        };
        self.attempts.push(StageAttempt {
            stage: stage.to_string(),
            task: None,
            started_at: Utc::now(),
            finished_at: None,
            outcome: AttemptOutcome::Running,
        });
    }

    pub(crate) fn set_task(&mut self, task: &str) {
        if let Some(attempt) = self.attempts.last_mut() {
            attempt.task = Some(task.to_string());
        }
    }

    pub(crate) fn finish_stage(&mut self, outcome: AttemptOutcome) {
        if let Some(attempt) = self.attempts.last_mut() {
            if attempt.outcome == AttemptOutcome::Running {
                attempt.outcome = outcome;
                attempt.finished_at = Some(Utc::now());
            }
        }
    }

    pub(crate) fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}
