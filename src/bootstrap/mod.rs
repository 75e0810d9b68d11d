// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Idempotent bootstrap of shared resources
//!
//! A [`BootstrapHandler`] drives each declared resource (a search index)
//! through `absent → creating → ready`, and back through `deleting`. Only one
//! operation per resource is ever in flight: callers asking for the same
//! operation wait for it and receive its outcome instead of issuing their own
//! call to the search service. A caller asking for the opposite operation
//! waits for the running one to settle, then starts its own.

mod search;

pub use search::{index_mapping, HttpSearchIndex, InMemorySearchIndex, SearchIndexService};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::errors::{CuraflowError, CuraflowResult};
use crate::pipeline::ResourceDefinition;

/// Lifecycle state of a bootstrap resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Absent,
    Creating,
    Ready,
    Failed,
    Deleting,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

/// Lifecycle event delivered by the deployment owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapEvent {
    Create,
    Update,
    Delete,
}

/// Outcome reported for an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    Success,
    Failure { message: String },
    /// Another operation is still running (only from [`BootstrapHandler::try_apply`])
    InProgress,
}

impl BootstrapOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Snapshot of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub name: String,
    pub index: String,
    pub state: ResourceState,
    #[serde(default)]
    pub last_error: Option<String>,
}

type OutcomeReceiver = watch::Receiver<Option<BootstrapOutcome>>;

struct Slot {
    definition: ResourceDefinition,
    state: ResourceState,
    last_error: Option<String>,
    in_flight: Option<InFlight>,
}

struct InFlight {
    operation: Operation,
    outcome: OutcomeReceiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Delete,
}

impl Operation {
    fn for_event(event: BootstrapEvent) -> Self {
        match event {
            BootstrapEvent::Create | BootstrapEvent::Update => Self::Create,
            BootstrapEvent::Delete => Self::Delete,
        }
    }
}

/// What `apply` does after inspecting a slot
enum Step {
    Settled,
    Join(OutcomeReceiver),
    WaitThenRetry(OutcomeReceiver),
}

struct Inner {
    service: Arc<dyn SearchIndexService>,
    slots: Mutex<HashMap<String, Slot>>,
}

/// State machine plus single-flight guard for bootstrap resources
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct BootstrapHandler {
    inner: Arc<Inner>,
}

impl BootstrapHandler {
    /// Track `resources`, all initially absent
    pub fn new(service: Arc<dyn SearchIndexService>, resources: &[ResourceDefinition]) -> Self {
        let slots = resources
            .iter()
            .map(|r| {
                (
                    r.name.clone(),
                    Slot {
                        definition: r.clone(),
                        state: ResourceState::Absent,
                        last_error: None,
                        in_flight: None,
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                service,
                slots: Mutex::new(slots),
            }),
        }
    }

    /// Apply an event and wait for its outcome
    ///
    /// If the same operation is already running on the resource, this waits
    /// for it and returns its outcome without starting another. If the
    /// opposite operation is running, this waits for it to settle and then
    /// applies `event` from the settled state.
    pub async fn apply(
        &self,
        resource: &str,
        event: BootstrapEvent,
    ) -> CuraflowResult<BootstrapOutcome> {
        let wanted = Operation::for_event(event);

        loop {
            let step = {
                let mut slots = self.inner.slots.lock().await;
                let slot = slots
                    .get_mut(resource)
                    .ok_or_else(|| CuraflowError::UnknownResource {
                        resource: resource.to_string(),
                    })?;

                match &slot.in_flight {
                    Some(running) if running.operation == wanted => {
                        tracing::debug!(resource, ?event, "joining in-flight bootstrap");
                        Step::Join(running.outcome.clone())
                    }
                    Some(running) => {
                        tracing::debug!(
                            resource,
                            ?event,
                            running = ?running.operation,
                            "waiting for in-flight bootstrap to settle"
                        );
                        Step::WaitThenRetry(running.outcome.clone())
                    }
                    None => match self.begin(resource, slot, event) {
                        Some(rx) => Step::Join(rx),
                        None => Step::Settled,
                    },
                }
            };

            match step {
                Step::Settled => return Ok(BootstrapOutcome::Success),
                Step::Join(rx) => return Ok(Self::await_outcome(rx).await),
                Step::WaitThenRetry(rx) => {
                    Self::await_outcome(rx).await;
                }
            }
        }
    }

    /// Apply an event unless an operation is already running
    pub async fn try_apply(
        &self,
        resource: &str,
        event: BootstrapEvent,
    ) -> CuraflowResult<BootstrapOutcome> {
        {
            let slots = self.inner.slots.lock().await;
            let slot = slots
                .get(resource)
                .ok_or_else(|| CuraflowError::UnknownResource {
                    resource: resource.to_string(),
                })?;
            if slot.in_flight.is_some() {
                return Ok(BootstrapOutcome::InProgress);
            }
        }

        self.apply(resource, event).await
    }

    /// Current state of a resource
    pub async fn state(&self, resource: &str) -> CuraflowResult<ResourceState> {
        self.inner
            .slots
            .lock()
            .await
            .get(resource)
            .map(|s| s.state)
            .ok_or_else(|| CuraflowError::UnknownResource {
                resource: resource.to_string(),
            })
    }

    /// Snapshot of every tracked resource, sorted by name
    pub async fn statuses(&self) -> Vec<ResourceStatus> {
        let slots = self.inner.slots.lock().await;
        let mut statuses: Vec<ResourceStatus> = slots
            .iter()
            .map(|(name, slot)| ResourceStatus {
                name: name.clone(),
                index: slot.definition.index.clone(),
                state: slot.state,
                last_error: slot.last_error.clone(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Reconcile settled states with the search service
    ///
    /// Resources with an operation in flight are left alone. A failed
    /// resource whose index turns out to exist is promoted to ready.
    pub async fn refresh(&self) -> CuraflowResult<()> {
        let targets: Vec<(String, String)> = {
            let slots = self.inner.slots.lock().await;
            slots
                .iter()
                .filter(|(_, s)| s.in_flight.is_none())
                .map(|(name, s)| (name.clone(), s.definition.index.clone()))
                .collect()
        };

        for (name, index) in targets {
            let exists = self.inner.service.index_exists(&index).await?;
            let mut slots = self.inner.slots.lock().await;
            if let Some(slot) = slots.get_mut(&name) {
                if slot.in_flight.is_some() {
                    continue;
                }
                slot.state = match (exists, slot.state) {
                    (true, _) => ResourceState::Ready,
                    (false, ResourceState::Failed) => ResourceState::Failed,
                    (false, _) => ResourceState::Absent,
                };
                if slot.state == ResourceState::Ready {
                    slot.last_error = None;
                }
            }
        }

        Ok(())
    }

    /// Fail with `ResourceNotReady` unless every named resource is ready
    pub async fn ensure_ready<'a, I>(&self, resources: I) -> CuraflowResult<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let slots = self.inner.slots.lock().await;
        for name in resources {
            let slot = slots
                .get(name)
                .ok_or_else(|| CuraflowError::UnknownResource {
                    resource: name.clone(),
                })?;
            if slot.state != ResourceState::Ready {
                return Err(CuraflowError::ResourceNotReady {
                    resource: name.clone(),
                    state: slot.state.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Decide what an event does from a settled state
    ///
    /// Returns `None` when the event is already satisfied; otherwise marks
    /// the slot transitional, spawns the operation and returns its receiver.
    fn begin(
        &self,
        resource: &str,
        slot: &mut Slot,
        event: BootstrapEvent,
    ) -> Option<OutcomeReceiver> {
        let operation = Operation::for_event(event);
        match (operation, slot.state) {
            (Operation::Create, ResourceState::Ready) => {
                tracing::debug!(resource, ?event, "resource already ready");
                return None;
            }
            (Operation::Create, _) => slot.state = ResourceState::Creating,
            (Operation::Delete, _) => slot.state = ResourceState::Deleting,
        }

        let (tx, rx) = watch::channel(None);
        slot.in_flight = Some(InFlight {
            operation,
            outcome: rx.clone(),
        });

        let inner = Arc::clone(&self.inner);
        let name = resource.to_string();
        let definition = slot.definition.clone();

        // Runs detached so that a caller giving up does not strand the slot
        tokio::spawn(async move {
            let result = match operation {
                Operation::Create => create(inner.service.as_ref(), &definition).await,
                Operation::Delete => delete(inner.service.as_ref(), &definition).await,
            };

            let outcome = {
                let mut slots = inner.slots.lock().await;
                let outcome = match result {
                    Ok(state) => {
                        tracing::info!(resource = %name, %state, "bootstrap settled");
                        if let Some(slot) = slots.get_mut(&name) {
                            slot.state = state;
                            slot.last_error = None;
                        }
                        BootstrapOutcome::Success
                    }
                    Err(e) => {
                        let message = e.to_string();
                        tracing::error!(resource = %name, error = %message, "bootstrap failed");
                        if let Some(slot) = slots.get_mut(&name) {
                            slot.state = ResourceState::Failed;
                            slot.last_error = Some(message.clone());
                        }
                        BootstrapOutcome::Failure { message }
                    }
                };
                if let Some(slot) = slots.get_mut(&name) {
                    slot.in_flight = None;
                }
                outcome
            };

            tx.send_replace(Some(outcome));
        });

        Some(rx)
    }

    async fn await_outcome(mut rx: OutcomeReceiver) -> BootstrapOutcome {
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(BootstrapOutcome::InProgress),
            Err(_) => BootstrapOutcome::Failure {
                message: "bootstrap operation was abandoned".into(),
            },
        }
    }
}

async fn create(
    service: &dyn SearchIndexService,
    definition: &ResourceDefinition,
) -> CuraflowResult<ResourceState> {
    if service.index_exists(&definition.index).await? {
        tracing::info!(index = %definition.index, "adopting existing search index");
        return Ok(ResourceState::Ready);
    }
    service
        .create_index(&definition.index, definition.dimension)
        .await?;
    Ok(ResourceState::Ready)
}

async fn delete(
    service: &dyn SearchIndexService,
    definition: &ResourceDefinition,
) -> CuraflowResult<ResourceState> {
    if service.index_exists(&definition.index).await? {
        service.delete_index(&definition.index).await?;
    }
    Ok(ResourceState::Absent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    fn index() -> ResourceDefinition {
        ResourceDefinition {
            name: "search-index".into(),
            index: "tables".into(),
            dimension: 1536,
        }
    }

    fn handler(service: Arc<InMemorySearchIndex>) -> BootstrapHandler {
        BootstrapHandler::new(service, &[index()])
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let service = Arc::new(InMemorySearchIndex::new());
        let handler = handler(Arc::clone(&service));

        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Absent);

        let first = handler.apply("search-index", BootstrapEvent::Create).await.unwrap();
        assert_eq!(first, BootstrapOutcome::Success);
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Ready);

        let second = handler.apply("search-index", BootstrapEvent::Create).await.unwrap();
        assert_eq!(second, BootstrapOutcome::Success);
        assert_eq!(service.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_adopts_existing_index() {
        let service = Arc::new(InMemorySearchIndex::new().with_index("tables", 1536));
        let handler = handler(Arc::clone(&service));

        let outcome = handler.apply("search-index", BootstrapEvent::Create).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Ready);
        assert_eq!(service.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_can_be_retried() {
        let service = Arc::new(InMemorySearchIndex::new());
        let handler = handler(Arc::clone(&service));

        service.fail_next_create("quota exceeded");
        let outcome = handler.apply("search-index", BootstrapEvent::Create).await.unwrap();
        assert!(matches!(outcome, BootstrapOutcome::Failure { ref message } if message.contains("quota")));
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Failed);
        assert!(handler.ensure_ready(&["search-index".to_string()]).await.is_err());

        let retry = handler.apply("search-index", BootstrapEvent::Create).await.unwrap();
        assert!(retry.is_success());
        assert_eq!(service.create_calls(), 2);

        let statuses = handler.statuses().await;
        assert_eq!(statuses[0].state, ResourceState::Ready);
        assert_eq!(statuses[0].last_error, None);
    }

    #[tokio::test]
    async fn test_update_is_ensure() {
        let service = Arc::new(InMemorySearchIndex::new());
        let handler = handler(Arc::clone(&service));

        handler.apply("search-index", BootstrapEvent::Update).await.unwrap();
        handler.apply("search-index", BootstrapEvent::Update).await.unwrap();

        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Ready);
        assert_eq!(service.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_tolerates_absence() {
        let service = Arc::new(InMemorySearchIndex::new());
        let handler = handler(Arc::clone(&service));

        let outcome = handler.apply("search-index", BootstrapEvent::Delete).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(service.delete_calls(), 0);

        handler.apply("search-index", BootstrapEvent::Create).await.unwrap();
        handler.apply("search-index", BootstrapEvent::Delete).await.unwrap();
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Absent);
        assert_eq!(service.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let handler = handler(Arc::new(InMemorySearchIndex::new()));
        let result = handler.apply("nope", BootstrapEvent::Create).await;
        assert!(matches!(result, Err(CuraflowError::UnknownResource { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_caller_joins_in_flight_create() {
        let service = Arc::new(InMemorySearchIndex::new().with_latency(Duration::from_secs(5)));
        let handler = handler(Arc::clone(&service));

        let mut first = tokio_test::task::spawn(handler.apply("search-index", BootstrapEvent::Create));
        assert_pending!(first.poll());
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Creating);

        let mut second = tokio_test::task::spawn(handler.apply("search-index", BootstrapEvent::Create));
        assert_pending!(second.poll());

        let skipped = handler.try_apply("search-index", BootstrapEvent::Create).await.unwrap();
        assert_eq!(skipped, BootstrapOutcome::InProgress);

        // index_exists + create_index, each with latency
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(first.is_woken());
        let first = assert_ready!(first.poll()).unwrap();
        let second = assert_ready!(second.poll()).unwrap();
        assert_eq!(first, BootstrapOutcome::Success);
        assert_eq!(second, BootstrapOutcome::Success);
        assert_eq!(service.create_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_during_create_runs_after_it() {
        let service = Arc::new(InMemorySearchIndex::new().with_latency(Duration::from_secs(5)));
        let handler = handler(Arc::clone(&service));

        let mut create = tokio_test::task::spawn(handler.apply("search-index", BootstrapEvent::Create));
        assert_pending!(create.poll());
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Creating);

        let delete = handler.apply("search-index", BootstrapEvent::Delete).await.unwrap();
        assert_eq!(delete, BootstrapOutcome::Success);
        assert_eq!(assert_ready!(create.poll()).unwrap(), BootstrapOutcome::Success);

        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Absent);
        assert_eq!(service.create_calls(), 1);
        assert_eq!(service.delete_calls(), 1);
        assert!(!service.index_exists("tables").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_during_delete_recreates() {
        let service = Arc::new(
            InMemorySearchIndex::new()
                .with_index("tables", 1536)
                .with_latency(Duration::from_secs(5)),
        );
        let handler = handler(Arc::clone(&service));
        handler.refresh().await.unwrap();

        let mut delete = tokio_test::task::spawn(handler.apply("search-index", BootstrapEvent::Delete));
        assert_pending!(delete.poll());
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Deleting);

        let create = handler.apply("search-index", BootstrapEvent::Create).await.unwrap();
        assert_eq!(create, BootstrapOutcome::Success);
        assert_eq!(assert_ready!(delete.poll()).unwrap(), BootstrapOutcome::Success);

        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Ready);
        assert_eq!(service.delete_calls(), 1);
        assert_eq!(service.create_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_concurrent_creates_issue_one_call() {
        let service = Arc::new(InMemorySearchIndex::new().with_latency(Duration::from_millis(200)));
        let handler = handler(Arc::clone(&service));

        let callers: Vec<_> = (0..16)
            .map(|_| {
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.apply("search-index", BootstrapEvent::Create).await
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.await.unwrap().unwrap(), BootstrapOutcome::Success);
        }
        assert_eq!(service.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_reconciles_with_service() {
        let service = Arc::new(InMemorySearchIndex::new().with_index("tables", 1536));
        let handler = handler(Arc::clone(&service));

        handler.refresh().await.unwrap();
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Ready);

        service.delete_index("tables").await.unwrap();
        handler.refresh().await.unwrap();
        assert_eq!(handler.state("search-index").await.unwrap(), ResourceState::Absent);
    }
}
