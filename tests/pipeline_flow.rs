// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

use std::sync::Arc;
use std::time::Duration;

use curaflow::bootstrap::{BootstrapEvent, BootstrapHandler, BootstrapOutcome, InMemorySearchIndex, ResourceState};
use curaflow::launcher::{SimulatedBehavior, SimulatedLauncher};
use curaflow::pipeline::{curation, FailureKind, RunStatus};
use curaflow::store::{FilesystemRunStore, InMemoryRunStore, RunStore};
use curaflow::{CuraflowError, PipelineService};

fn service_with(
    launcher: Arc<SimulatedLauncher>,
    index: Arc<InMemorySearchIndex>,
    store: Arc<dyn RunStore>,
) -> PipelineService {
    let definition = curation::definition();
    let bootstrap = BootstrapHandler::new(index, &definition.resources);
    PipelineService::new(definition, launcher, store, bootstrap).unwrap()
}

fn context() -> curaflow::Context {
    curation::initial_context("s3://in/orders.csv", "s3://in/orders.dqdl", "orders")
}

#[tokio::test]
async fn five_stage_curation_end_to_end() {
    let launcher = Arc::new(SimulatedLauncher::default());
    let index = Arc::new(InMemorySearchIndex::new());
    let service = service_with(launcher.clone(), index.clone(), Arc::new(InMemoryRunStore::new()));

    let outcome = service
        .bootstrap()
        .apply(curation::SEARCH_INDEX, BootstrapEvent::Create)
        .await
        .unwrap();
    assert_eq!(outcome, BootstrapOutcome::Success);

    let id = service.submit(curation::WORKFLOW, context()).await.unwrap();
    let run = service.wait(id).await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.completed_stages(), curation::STAGES.to_vec());
    assert_eq!(launcher.launched_stages(), curation::STAGES.to_vec());

    // Every placeholder was replaced by a produced location
    for key in curation::OUTPUT_KEYS {
        let value = run.context.get(key).unwrap();
        assert!(value.starts_with("sim://curaflow/"), "{} = {}", key, value);
    }
    assert_eq!(run.context.get("TableName").unwrap(), "orders");

    // Curate sees the description produced by duplicate detection
    let curate = launcher
        .launches()
        .into_iter()
        .find(|r| r.stage == "curate")
        .unwrap();
    assert_eq!(
        curate.env.get("S3_INPUT_DESC"),
        Some(&run.context.get("S3OutputTableDesc").unwrap().to_string())
    );
    assert_eq!(index.create_calls(), 1);
}

#[tokio::test]
async fn submission_rejected_until_index_ready() {
    let launcher = Arc::new(SimulatedLauncher::default());
    let service = service_with(
        launcher.clone(),
        Arc::new(InMemorySearchIndex::new()),
        Arc::new(InMemoryRunStore::new()),
    );

    let result = service.submit(curation::WORKFLOW, context()).await;
    assert!(matches!(result, Err(CuraflowError::ResourceNotReady { .. })));
    assert!(launcher.launches().is_empty());
    assert!(service.runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_input_makes_no_external_calls() {
    let launcher = Arc::new(SimulatedLauncher::default());
    let index = Arc::new(InMemorySearchIndex::new());
    let service = service_with(launcher.clone(), index.clone(), Arc::new(InMemoryRunStore::new()));

    let partial = curaflow::Context::new()
        .with("S3Input", "s3://in/orders.csv")
        .with("S3InputDQDL", "s3://in/orders.dqdl");

    match service.submit(curation::WORKFLOW, partial).await {
        Err(CuraflowError::MissingInput { stage, key }) => {
            assert_eq!(stage, "curate");
            assert_eq!(key, "TableName");
        }
        other => panic!("Expected MissingInput, got {:?}", other),
    }
    assert!(launcher.launches().is_empty());
    assert_eq!(index.create_calls(), 0);
}

#[tokio::test]
async fn third_stage_failure_stops_the_chain() {
    let launcher = Arc::new(
        SimulatedLauncher::default()
            .with_behavior("inspect", SimulatedBehavior::Fail("schema mismatch".into())),
    );
    let index = Arc::new(InMemorySearchIndex::new().with_index("table-descriptions", 1536));
    let service = service_with(launcher.clone(), index, Arc::new(InMemoryRunStore::new()));
    service.bootstrap().refresh().await.unwrap();

    let id = service.submit(curation::WORKFLOW, context()).await.unwrap();
    let run = service.wait(id).await.unwrap();

    match &run.status {
        RunStatus::Failed { reason } => {
            assert_eq!(reason.stage, "inspect");
            assert_eq!(reason.kind, FailureKind::Task);
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    assert_eq!(launcher.launched_stages(), vec!["subsample-first", "subsample-second", "inspect"]);

    // Outputs of the stages that succeeded are kept for diagnosis
    assert!(run.context.get("S3OutputFirst").unwrap().starts_with("sim://"));
    assert_eq!(run.context.get("S3OutputSchema1").unwrap(), "");
}

#[tokio::test(start_paused = true)]
async fn hung_stage_times_out_at_thirty_minutes() {
    let launcher = Arc::new(SimulatedLauncher::default().with_behavior("curate", SimulatedBehavior::Hang));
    let index = Arc::new(InMemorySearchIndex::new().with_index("table-descriptions", 1536));
    let service = service_with(launcher.clone(), index, Arc::new(InMemoryRunStore::new()));
    service.bootstrap().refresh().await.unwrap();

    let started = tokio::time::Instant::now();
    let id = service.submit(curation::WORKFLOW, context()).await.unwrap();
    let run = service.wait(id).await.unwrap();

    assert_eq!(
        run.status,
        RunStatus::TimedOut {
            stage: Some("curate".into())
        }
    );
    assert!(started.elapsed() >= Duration::from_secs(30 * 60));
    assert_eq!(launcher.cancels().len(), 1);
}

#[tokio::test]
async fn concurrent_bootstrap_creates_once() {
    let index = Arc::new(InMemorySearchIndex::new().with_latency(Duration::from_millis(50)));
    let handler = BootstrapHandler::new(index.clone(), &curation::definition().resources);

    let mut joins = Vec::new();
    for _ in 0..8 {
        let handler = handler.clone();
        joins.push(tokio::spawn(async move {
            handler.apply(curation::SEARCH_INDEX, BootstrapEvent::Create).await
        }));
    }
    for join in joins {
        assert_eq!(join.await.unwrap().unwrap(), BootstrapOutcome::Success);
    }

    assert_eq!(index.create_calls(), 1);
    assert_eq!(handler.state(curation::SEARCH_INDEX).await.unwrap(), ResourceState::Ready);

    // Repeating the event is a no-op
    handler.apply(curation::SEARCH_INDEX, BootstrapEvent::Create).await.unwrap();
    assert_eq!(index.create_calls(), 1);
}

#[tokio::test]
async fn run_records_survive_in_the_filesystem_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let store: Arc<dyn RunStore> = Arc::new(FilesystemRunStore::new(dir.path().join("runs")).unwrap());
    let service = service_with(
        Arc::new(SimulatedLauncher::default()),
        Arc::new(InMemorySearchIndex::new()),
        store,
    );

    let id = service
        .submit("inspect-only", curaflow::Context::new().with("S3Input", "s3://in/orders.csv"))
        .await
        .unwrap();
    service.wait(id).await.unwrap();

    let reopened = FilesystemRunStore::new(dir.path().join("runs")).unwrap();
    let run = reopened.load(id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.stages.len(), 3);
}
