// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Process launcher
//!
//! Runs a stage's container reference as a shell command line (`sh -c`), so
//! quoting inside the reference is honored. The leading program is resolved
//! on `PATH` before spawning. Outputs are read from `::output NAME=value`
//! lines on stdout.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::{
    parse_output_lines, LaunchRequest, TaskHandle, TaskLauncher, TaskOutcome, EXPECTED_OUTPUTS_ENV,
};
use crate::errors::{CuraflowError, CuraflowResult};

struct RunningTask {
    cancel: Option<oneshot::Sender<()>>,
    monitor: Option<JoinHandle<TaskOutcome>>,
}

/// Shell used to interpret container references
pub const DEFAULT_SHELL: &str = "sh";

/// Launches stages as local processes
pub struct ProcessLauncher {
    working_dir: PathBuf,
    shell: String,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskHandle, RunningTask>>,
}

impl ProcessLauncher {
    /// Create a launcher running tasks in `working_dir`
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            shell: DEFAULT_SHELL.to_string(),
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Program a command line starts with, skipping `NAME=value` prefixes
    fn leading_program(container: &str) -> Option<&str> {
        container
            .split_whitespace()
            .find(|word| !is_env_assignment(word))
            .map(|word| word.trim_matches(|c| c == '\'' || c == '"'))
            .filter(|word| !word.is_empty())
    }

    /// Number of tracked tasks
    pub async fn tracked_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

#[async_trait]
impl TaskLauncher for ProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    async fn launch(&self, request: LaunchRequest) -> CuraflowResult<TaskHandle> {
        let program = Self::leading_program(&request.container).ok_or_else(|| {
            CuraflowError::launch_failed(&request.stage, "empty container reference")
        })?;

        let program_path = which::which(program).map_err(|e| {
            CuraflowError::launch_failed(&request.stage, format!("'{}' not found: {}", program, e))
        })?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&request.container)
            .current_dir(&self.working_dir)
            .envs(&request.env)
            .env(EXPECTED_OUTPUTS_ENV, request.expected_outputs.join(","))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            CuraflowError::launch_failed(
                &request.stage,
                format!("shell '{}' could not start: {}", self.shell, e),
            )
        })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = TaskHandle::new(format!("proc-{}-{}", request.stage, id));

        tracing::debug!(
            task = %handle,
            program = %program_path.display(),
            cpu = request.compute.cpu,
            memory_mib = request.compute.memory_mib,
            "spawned process"
        );

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let monitor = tokio::spawn(async move {
            let read_stdout = async {
                let mut buf = String::new();
                if let Some(out) = stdout.as_mut() {
                    let _ = out.read_to_string(&mut buf).await;
                }
                buf
            };
            let read_stderr = async {
                let mut buf = String::new();
                if let Some(err) = stderr.as_mut() {
                    let _ = err.read_to_string(&mut buf).await;
                }
                buf
            };

            tokio::select! {
                (status, out, err) = async { tokio::join!(child.wait(), read_stdout, read_stderr) } => {
                    match status {
                        Ok(status) if status.success() => TaskOutcome::Succeeded {
                            outputs: parse_output_lines(&out),
                        },
                        Ok(status) => {
                            let tail: Vec<&str> = err.lines().rev().take(5).collect();
                            let tail: Vec<&str> = tail.into_iter().rev().collect();
                            TaskOutcome::Failed {
                                cause: format!(
                                    "exit code {}: {}",
                                    status.code().unwrap_or(-1),
                                    tail.join(" | ")
                                ),
                            }
                        }
                        Err(e) => TaskOutcome::Failed { cause: e.to_string() },
                    }
                }
                _ = cancel_rx => {
                    // kill_on_drop reaps the child when the select drops it
                    TaskOutcome::Cancelled
                }
            }
        });

        self.tasks.lock().await.insert(
            handle.clone(),
            RunningTask {
                cancel: Some(cancel_tx),
                monitor: Some(monitor),
            },
        );

        Ok(handle)
    }

    async fn wait(&self, handle: &TaskHandle) -> CuraflowResult<TaskOutcome> {
        let monitor = {
            let mut tasks = self.tasks.lock().await;
            let task = tasks.get_mut(handle).ok_or_else(|| CuraflowError::UnknownTask {
                task: handle.to_string(),
            })?;
            task.monitor.take().ok_or_else(|| CuraflowError::UnknownTask {
                task: handle.to_string(),
            })?
        };

        let outcome = monitor.await.unwrap_or_else(|e| TaskOutcome::Failed {
            cause: format!("task monitor panicked: {}", e),
        });

        self.tasks.lock().await.remove(handle);
        Ok(outcome)
    }

    async fn cancel(&self, handle: &TaskHandle) -> CuraflowResult<()> {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks.get_mut(handle) else {
            return Ok(());
        };

        if let Some(cancel) = task.cancel.take() {
            // The monitor may already have finished; that's fine
            let _ = cancel.send(());
        }

        // With the monitor already taken, a wait is in progress or was
        // dropped on timeout; either way nothing will collect this entry
        if task.monitor.is_none() {
            tasks.remove(handle);
        }
        Ok(())
    }

    async fn check_available(&self, container: &str) -> CuraflowResult<bool> {
        Ok(Self::leading_program(container)
            .map(|program| which::which(program).is_ok())
            .unwrap_or(false))
    }
}
