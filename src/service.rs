// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Pipeline submission service
//!
//! The entry point callers use: submit a workflow with an initial context,
//! get a run id back, then query or wait on it. Every check that can reject
//! a submission (compilation, resource readiness) happens before the run is
//! recorded or anything is launched.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bootstrap::BootstrapHandler;
use crate::errors::{CuraflowError, CuraflowResult};
use crate::launcher::TaskLauncher;
use crate::pipeline::{
    ChainCompiler, Context, ExecutionPlan, PipelineDefinition, PipelineExecutor, PipelineRun,
    RunId, StageRegistry,
};
use crate::store::RunStore;

/// Accepts submissions and tracks the runs they start
pub struct PipelineService {
    definition: Arc<PipelineDefinition>,
    registry: StageRegistry,
    executor: PipelineExecutor,
    store: Arc<dyn RunStore>,
    bootstrap: BootstrapHandler,
    running: Mutex<HashMap<RunId, JoinHandle<PipelineRun>>>,
}

impl PipelineService {
    /// Build a service for a pipeline definition
    ///
    /// Fails if any stage definition is invalid.
    pub fn new(
        definition: PipelineDefinition,
        launcher: Arc<dyn TaskLauncher>,
        store: Arc<dyn RunStore>,
        bootstrap: BootstrapHandler,
    ) -> CuraflowResult<Self> {
        let registry = StageRegistry::from_definition(&definition)?;

        Ok(Self {
            definition: Arc::new(definition),
            registry,
            executor: PipelineExecutor::new(launcher, Arc::clone(&store)),
            store,
            bootstrap,
            running: Mutex::new(HashMap::new()),
        })
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn bootstrap(&self) -> &BootstrapHandler {
        &self.bootstrap
    }

    /// Compile a workflow against the keys of `context`
    pub fn compile(&self, workflow: &str, context: &Context) -> CuraflowResult<ExecutionPlan> {
        ChainCompiler::new(&self.registry).compile_workflow(&self.definition, workflow, &context.keys())
    }

    /// Submit a workflow for execution
    ///
    /// Validation errors and `ResourceNotReady` are returned here, before
    /// any run exists.
    pub async fn submit(&self, workflow: &str, context: Context) -> CuraflowResult<RunId> {
        let plan = self.compile(workflow, &context)?;
        self.submit_plan(plan, context).await
    }

    /// Submit an already compiled plan
    pub async fn submit_plan(&self, plan: ExecutionPlan, context: Context) -> CuraflowResult<RunId> {
        self.bootstrap.ensure_ready(plan.required_resources()).await?;

        let id = RunId::new();
        let run = PipelineRun::new(id, &plan, context);
        self.store.save(&run).await?;

        tracing::info!(
            run_id = %id,
            workflow = %plan.workflow(),
            plan = %plan.fingerprint(),
            "run submitted"
        );

        let executor = self.executor.clone();
        let handle = tokio::spawn(async move { executor.execute(&plan, run).await });

        let mut running = self.running.lock().await;
        // Finished runs are served from the store; only live handles are kept
        running.retain(|_, handle| !handle.is_finished());
        running.insert(id, handle);

        Ok(id)
    }

    /// Latest recorded state of a run
    pub async fn status(&self, id: RunId) -> CuraflowResult<PipelineRun> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| CuraflowError::RunNotFound {
                run_id: id.to_string(),
            })
    }

    /// Wait for a run to reach a terminal status
    pub async fn wait(&self, id: RunId) -> CuraflowResult<PipelineRun> {
        let handle = self.running.lock().await.remove(&id);

        match handle {
            Some(handle) => handle.await.map_err(|e| CuraflowError::RunAborted {
                run_id: id.to_string(),
                message: e.to_string(),
            }),
            None => {
                let run = self.status(id).await?;
                if run.is_finished() {
                    Ok(run)
                } else {
                    // Started by another process; nothing here to wait on
                    Err(CuraflowError::RunAborted {
                        run_id: id.to_string(),
                        message: format!("run is {} but not owned by this process", run.status),
                    })
                }
            }
        }
    }

    /// Number of runs this service still holds a task handle for
    pub async fn tracked_runs(&self) -> usize {
        self.running.lock().await.len()
    }

    /// All recorded runs, most recent first
    pub async fn runs(&self) -> CuraflowResult<Vec<PipelineRun>> {
        self.store.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{BootstrapEvent, InMemorySearchIndex};
    use crate::launcher::SimulatedLauncher;
    use crate::pipeline::{curation, RunStatus};
    use crate::store::InMemoryRunStore;

    fn service(launcher: Arc<SimulatedLauncher>) -> PipelineService {
        let definition = curation::definition();
        let bootstrap = BootstrapHandler::new(
            Arc::new(InMemorySearchIndex::new()),
            &definition.resources,
        );
        PipelineService::new(
            definition,
            launcher,
            Arc::new(InMemoryRunStore::new()),
            bootstrap,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_input_rejected_without_launch() {
        let launcher = Arc::new(SimulatedLauncher::default());
        let service = service(launcher.clone());

        let context = Context::new().with("S3Input", "a");
        let result = service.submit(curation::WORKFLOW, context).await;

        assert!(matches!(result, Err(CuraflowError::MissingInput { .. })));
        assert!(launcher.launches().is_empty());
        assert!(service.runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resource_not_ready_rejected() {
        let launcher = Arc::new(SimulatedLauncher::default());
        let service = service(launcher.clone());

        let context = curation::initial_context("a", "x", "mytable");
        let result = service.submit(curation::WORKFLOW, context).await;

        match result {
            Err(CuraflowError::ResourceNotReady { resource, state }) => {
                assert_eq!(resource, curation::SEARCH_INDEX);
                assert_eq!(state, "absent");
            }
            other => panic!("Expected ResourceNotReady, got {:?}", other),
        }
        assert!(launcher.launches().is_empty());
    }

    #[tokio::test]
    async fn test_workflow_without_resources_runs_before_bootstrap() {
        let launcher = Arc::new(SimulatedLauncher::default());
        let service = service(launcher.clone());

        let id = service
            .submit("inspect-only", Context::new().with("S3Input", "a"))
            .await
            .unwrap();
        let run = service.wait(id).await.unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(launcher.launched_stages().len(), 3);
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let launcher = Arc::new(SimulatedLauncher::default());
        let service = service(launcher.clone());
        service
            .bootstrap()
            .apply(curation::SEARCH_INDEX, BootstrapEvent::Create)
            .await
            .unwrap();

        let context = curation::initial_context("a", "x", "mytable");
        let id = service.submit(curation::WORKFLOW, context).await.unwrap();

        let run = service.wait(id).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(service.status(id).await.unwrap(), run);

        // Already waited on: served from the store
        assert_eq!(service.wait(id).await.unwrap().status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_finished_handles_are_released_without_wait() {
        let service = service(Arc::new(SimulatedLauncher::default()));
        let context = Context::new().with("S3Input", "a");

        let first = service.submit("inspect-only", context.clone()).await.unwrap();
        while !service.status(first).await.unwrap().is_finished() {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;

        let second = service.submit("inspect-only", context).await.unwrap();
        assert_eq!(service.tracked_runs().await, 1);

        service.wait(second).await.unwrap();
        assert_eq!(service.tracked_runs().await, 0);

        // Released runs are still answered from the store
        assert_eq!(service.wait(first).await.unwrap().status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let service = service(Arc::new(SimulatedLauncher::default()));
        let result = service.status(RunId::new()).await;
        assert!(matches!(result, Err(CuraflowError::RunNotFound { .. })));
    }
}
