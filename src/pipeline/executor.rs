// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Pipeline executor
//!
//! Steps through a compiled plan one stage at a time, threading the context
//! from stage to stage. The first stage failure ends the run; nothing is
//! retried. A single deadline covers the whole run, and when it passes the
//! in-flight task is asked to cancel.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};

use crate::errors::CuraflowResult;
use crate::launcher::{LaunchRequest, TaskHandle, TaskLauncher, TaskOutcome};
use crate::pipeline::{
    AttemptOutcome, Context, ExecutionPlan, FailureKind, FailureReason, PipelineRun, RunStatus,
    StageDefinition,
};
use crate::store::RunStore;

/// Where a stage ended up
enum StageResult {
    Succeeded(Context),
    Failed(FailureReason),
    TimedOut,
}

/// Runs plans against a task launcher
#[derive(Clone)]
pub struct PipelineExecutor {
    launcher: Arc<dyn TaskLauncher>,
    store: Arc<dyn RunStore>,
}

impl PipelineExecutor {
    pub fn new(launcher: Arc<dyn TaskLauncher>, store: Arc<dyn RunStore>) -> Self {
        Self { launcher, store }
    }

    /// Execute `plan`, starting from the pending `run`
    ///
    /// Stage failures are recorded on the returned run, never raised. The
    /// deadline is measured from the moment this is called.
    pub async fn execute(&self, plan: &ExecutionPlan, mut run: PipelineRun) -> PipelineRun {
        let deadline = Instant::now() + plan.deadline();
        let run_id = run.id.to_string();

        tracing::info!(
            run_id = %run_id,
            workflow = %plan.workflow(),
            stages = plan.len(),
            deadline_secs = plan.deadline().as_secs(),
            "run started"
        );

        for (index, stage) in plan.stages().iter().enumerate() {
            if Instant::now() >= deadline {
                tracing::warn!(run_id = %run_id, "deadline passed between stages");
                run.finish(RunStatus::TimedOut { stage: None });
                self.persist(&run).await;
                return run;
            }

            run.start_stage(index, &stage.name);
            self.persist(&run).await;
            tracing::info!(run_id = %run_id, stage = %stage.name, index, "stage started");

            match self.run_stage(stage, &mut run, deadline).await {
                StageResult::Succeeded(context) => {
                    run.context = context;
                    run.finish_stage(AttemptOutcome::Succeeded);
                    self.persist(&run).await;
                    tracing::info!(run_id = %run_id, stage = %stage.name, "stage succeeded");
                }
                StageResult::Failed(reason) => {
                    run.finish_stage(AttemptOutcome::Failed);
                    tracing::error!(run_id = %run_id, stage = %stage.name, reason = %reason, "stage failed");
                    run.finish(RunStatus::Failed { reason });
                    self.persist(&run).await;
                    return run;
                }
                StageResult::TimedOut => {
                    run.finish_stage(AttemptOutcome::Cancelled);
                    tracing::warn!(run_id = %run_id, stage = %stage.name, "run timed out");
                    run.finish(RunStatus::TimedOut {
                        stage: Some(stage.name.clone()),
                    });
                    self.persist(&run).await;
                    return run;
                }
            }
        }

        run.finish(RunStatus::Succeeded);
        self.persist(&run).await;
        tracing::info!(run_id = %run_id, "run succeeded");
        run
    }

    async fn run_stage(
        &self,
        stage: &StageDefinition,
        run: &mut PipelineRun,
        deadline: Instant,
    ) -> StageResult {
        let failed = |kind: FailureKind, message: String| {
            StageResult::Failed(FailureReason {
                stage: stage.name.clone(),
                kind,
                message,
            })
        };

        let request = match launch_request(stage, &run.context) {
            Ok(request) => request,
            Err(e) => return failed(FailureKind::Launch, e.to_string()),
        };

        let handle = match timeout_at(deadline, self.launcher.launch(request)).await {
            Err(_) => return StageResult::TimedOut,
            Ok(Err(e)) => return failed(FailureKind::Launch, e.to_string()),
            Ok(Ok(handle)) => handle,
        };

        run.set_task(handle.as_str());
        self.persist(run).await;
        tracing::debug!(stage = %stage.name, task = %handle, "task launched");

        let outcome = match timeout_at(deadline, self.launcher.wait(&handle)).await {
            Err(_) => {
                self.cancel(&handle).await;
                return StageResult::TimedOut;
            }
            Ok(Err(e)) => return failed(FailureKind::Launch, e.to_string()),
            Ok(Ok(outcome)) => outcome,
        };

        match outcome {
            TaskOutcome::Succeeded { outputs } => match collect_outputs(stage, &outputs) {
                Ok(values) => StageResult::Succeeded(run.context.merge(values)),
                Err(missing) => failed(
                    FailureKind::ContractViolation {
                        missing: missing.clone(),
                    },
                    format!("task succeeded without producing {}", missing.join(", ")),
                ),
            },
            TaskOutcome::Failed { cause } => failed(FailureKind::Task, cause),
            TaskOutcome::Cancelled => {
                failed(FailureKind::Cancelled, "task was cancelled externally".into())
            }
        }
    }

    async fn cancel(&self, handle: &TaskHandle) {
        tracing::info!(task = %handle, "cancelling in-flight task");
        if let Err(e) = self.launcher.cancel(handle).await {
            // Best effort; the run is already over
            tracing::warn!(task = %handle, error = %e, "cancel request failed");
        }
    }

    async fn persist(&self, run: &PipelineRun) {
        if let Err(e) = self.store.save(run).await {
            tracing::warn!(run_id = %run.id, error = %e, "failed to record run state");
        }
    }
}

/// Environment and metadata for launching `stage` against `context`
///
/// Inputs come from the context; outputs carry their pre-assigned location
/// when the context already holds one; static params are added last.
pub fn launch_request(stage: &StageDefinition, context: &Context) -> CuraflowResult<LaunchRequest> {
    let mut env = BTreeMap::new();

    for (key, name) in &stage.inputs {
        env.insert(name.clone(), context.get(key)?.to_string());
    }

    for (key, name) in &stage.outputs {
        if let Ok(assigned) = context.get(key) {
            env.insert(name.clone(), assigned.to_string());
        }
    }

    for (name, value) in &stage.params {
        env.insert(name.clone(), value.clone());
    }

    Ok(LaunchRequest {
        stage: stage.name.clone(),
        container: stage.container.clone(),
        compute: stage.compute,
        env,
        expected_outputs: stage.outputs.values().cloned().collect(),
    })
}

/// Map reported outputs (keyed by env name) back to context keys
///
/// Every declared output must be reported with a non-empty value; the
/// declared keys that weren't are returned as the error.
fn collect_outputs(
    stage: &StageDefinition,
    reported: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, Vec<String>> {
    let mut values = Vec::with_capacity(stage.outputs.len());
    let mut missing = Vec::new();

    for (key, name) in &stage.outputs {
        match reported.get(name) {
            Some(value) if !value.is_empty() => values.push((key.clone(), value.clone())),
            _ => missing.push(key.clone()),
        }
    }

    for name in reported.keys() {
        if stage.output_key_for_env(name).is_none() {
            tracing::debug!(stage = %stage.name, output = %name, "ignoring undeclared output");
        }
    }

    if missing.is_empty() {
        Ok(values)
    } else {
        Err(missing)
    }
}
