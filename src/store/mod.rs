// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Run store
//!
//! Keeps the latest record of every run so its status can be queried while
//! the executor advances and after the process that ran it is gone.

mod filesystem;

pub use filesystem::FilesystemRunStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::CuraflowResult;
use crate::pipeline::{PipelineRun, RunId};

/// Trait for run store implementations
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace the record of a run
    async fn save(&self, run: &PipelineRun) -> CuraflowResult<()>;

    /// Latest record of a run
    async fn load(&self, id: RunId) -> CuraflowResult<Option<PipelineRun>>;

    /// All known runs, most recently submitted first
    async fn list(&self) -> CuraflowResult<Vec<PipelineRun>>;

    /// Forget a run
    async fn remove(&self, id: RunId) -> CuraflowResult<()>;

    /// Store statistics
    async fn stats(&self) -> CuraflowResult<StoreStats> {
        let runs = self.list().await?;
        let mut stats = StoreStats::default();
        for run in &runs {
            stats.runs += 1;
            match run.status.label() {
                "succeeded" => stats.succeeded += 1,
                "failed" | "timed-out" => stats.failed += 1,
                _ => stats.active += 1,
            }
        }
        Ok(stats)
    }
}

/// Run store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub runs: usize,
    pub active: usize,
    pub succeeded: usize,
    /// Failed or timed out
    pub failed: usize,
}

/// Process-local run store
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, PipelineRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: &PipelineRun) -> CuraflowResult<()> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn load(&self, id: RunId) -> CuraflowResult<Option<PipelineRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> CuraflowResult<Vec<PipelineRun>> {
        let mut runs: Vec<PipelineRun> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(runs)
    }

    async fn remove(&self, id: RunId) -> CuraflowResult<()> {
        self.runs.write().await.remove(&id);
        Ok(())
    }
}
