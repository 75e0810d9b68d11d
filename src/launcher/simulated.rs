// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Simulated launcher for dry runs and tests
//!
//! Every launched stage "produces" deterministic locations. Individual stages
//! can be scripted to fail, hang until cancelled, stall in launch, or omit
//! their outputs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use super::{LaunchRequest, TaskHandle, TaskLauncher, TaskOutcome};
use crate::errors::{CuraflowError, CuraflowResult};

/// Scripted behavior of a simulated stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedBehavior {
    /// Report every expected output immediately
    Succeed,
    /// Report every expected output after a delay
    SucceedAfter(Duration),
    /// Run and fail with a cause
    Fail(String),
    /// Never finish until cancelled
    Hang,
    /// Never return from the launch call
    HangOnLaunch,
    /// Succeed without reporting the given environment names
    OmitOutputs(Vec<String>),
    /// Refuse the launch itself
    RefuseLaunch(String),
}

struct SimulatedTask {
    request: LaunchRequest,
    behavior: SimulatedBehavior,
    cancelled: watch::Sender<bool>,
}

/// Deterministic in-process launcher
pub struct SimulatedLauncher {
    prefix: String,
    behaviors: HashMap<String, SimulatedBehavior>,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskHandle, SimulatedTask>>,
    launches: Mutex<Vec<LaunchRequest>>,
    cancels: Mutex<Vec<TaskHandle>>,
}

impl SimulatedLauncher {
    /// Create a launcher whose outputs live under `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
            behaviors: HashMap::new(),
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        }
    }

    /// Script the behavior of one stage
    #[must_use]
    pub fn with_behavior(mut self, stage: impl Into<String>, behavior: SimulatedBehavior) -> Self {
        self.behaviors.insert(stage.into(), behavior);
        self
    }

    /// Every launch request received, in order
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Stage names in launch order
    pub fn launched_stages(&self) -> Vec<String> {
        self.launches().into_iter().map(|r| r.stage).collect()
    }

    /// Every cancellation request received
    pub fn cancels(&self) -> Vec<TaskHandle> {
        self.cancels.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Value a task reports for an expected output
    ///
    /// A non-empty pre-assigned location is echoed back; otherwise the
    /// output lands under `{prefix}/{stage}/{env}`.
    fn output_value(&self, request: &LaunchRequest, env: &str) -> String {
        match request.env.get(env) {
            Some(assigned) if !assigned.is_empty() => assigned.clone(),
            _ => format!("{}/{}/{}", self.prefix, request.stage, env.to_lowercase()),
        }
    }

    fn outputs_for(&self, request: &LaunchRequest, omit: &[String]) -> TaskOutcome {
        TaskOutcome::Succeeded {
            outputs: request
                .expected_outputs
                .iter()
                .filter(|env| !omit.contains(env))
                .map(|env| (env.clone(), self.output_value(request, env)))
                .collect(),
        }
    }

    fn lock_error() -> CuraflowError {
        CuraflowError::Io {
            message: "simulated launcher state poisoned".into(),
        }
    }
}

impl Default for SimulatedLauncher {
    fn default() -> Self {
        Self::new("sim://curaflow")
    }
}

#[async_trait]
impl TaskLauncher for SimulatedLauncher {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn launch(&self, request: LaunchRequest) -> CuraflowResult<TaskHandle> {
        self.launches
            .lock()
            .map_err(|_| Self::lock_error())?
            .push(request.clone());

        let behavior = self
            .behaviors
            .get(&request.stage)
            .cloned()
            .unwrap_or(SimulatedBehavior::Succeed);

        match &behavior {
            SimulatedBehavior::RefuseLaunch(message) => {
                return Err(CuraflowError::launch_failed(&request.stage, message.clone()));
            }
            SimulatedBehavior::HangOnLaunch => {
                tracing::debug!(stage = %request.stage, "simulated launch stalled");
                return std::future::pending().await;
            }
            _ => {}
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = TaskHandle::new(format!("sim-{}-{}", request.stage, id));
        let (cancelled, _) = watch::channel(false);

        tracing::debug!(task = %handle, stage = %request.stage, "simulated launch");

        self.tasks.lock().map_err(|_| Self::lock_error())?.insert(
            handle.clone(),
            SimulatedTask {
                request,
                behavior,
                cancelled,
            },
        );

        Ok(handle)
    }

    async fn wait(&self, handle: &TaskHandle) -> CuraflowResult<TaskOutcome> {
        let (request, behavior, mut cancelled) = {
            let tasks = self.tasks.lock().map_err(|_| Self::lock_error())?;
            let task = tasks.get(handle).ok_or_else(|| CuraflowError::UnknownTask {
                task: handle.to_string(),
            })?;
            (
                task.request.clone(),
                task.behavior.clone(),
                task.cancelled.subscribe(),
            )
        };

        if *cancelled.borrow() {
            return Ok(TaskOutcome::Cancelled);
        }

        let outcome = match behavior {
            SimulatedBehavior::Succeed => self.outputs_for(&request, &[]),
            SimulatedBehavior::SucceedAfter(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => self.outputs_for(&request, &[]),
                    _ = cancelled.wait_for(|c| *c) => TaskOutcome::Cancelled,
                }
            }
            SimulatedBehavior::Fail(cause) => TaskOutcome::Failed { cause },
            SimulatedBehavior::Hang => {
                // Only a cancel ends a hung task
                let _ = cancelled.wait_for(|c| *c).await;
                TaskOutcome::Cancelled
            }
            SimulatedBehavior::OmitOutputs(omit) => self.outputs_for(&request, &omit),
            SimulatedBehavior::RefuseLaunch(cause) => TaskOutcome::Failed { cause },
            SimulatedBehavior::HangOnLaunch => TaskOutcome::Failed {
                cause: "launch never completed".into(),
            },
        };

        Ok(outcome)
    }

    async fn cancel(&self, handle: &TaskHandle) -> CuraflowResult<()> {
        self.cancels
            .lock()
            .map_err(|_| Self::lock_error())?
            .push(handle.clone());

        if let Some(task) = self
            .tasks
            .lock()
            .map_err(|_| Self::lock_error())?
            .get(handle)
        {
            task.cancelled.send_replace(true);
        }
        Ok(())
    }

    async fn check_available(&self, _container: &str) -> CuraflowResult<bool> {
        Ok(true)
    }
}
