// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Filesystem-based run store
//!
//! Stores one JSON file per run in a runs directory.

use async_trait::async_trait;
use std::path::PathBuf;

use super::RunStore;
use crate::errors::{CuraflowError, CuraflowResult};
use crate::pipeline::{PipelineRun, RunId};

/// Filesystem-based run store
pub struct FilesystemRunStore {
    runs_dir: PathBuf,
}

impl FilesystemRunStore {
    /// Create a store rooted at `runs_dir`
    pub fn new(runs_dir: PathBuf) -> CuraflowResult<Self> {
        if !runs_dir.exists() {
            std::fs::create_dir_all(&runs_dir).map_err(|e| CuraflowError::StoreError {
                message: format!("Failed to create runs directory: {}", e),
            })?;
        }

        Ok(Self { runs_dir })
    }

    /// Create a store under `.curaflow/runs` in `base_dir`
    pub fn default_store(base_dir: PathBuf) -> CuraflowResult<Self> {
        Self::new(base_dir.join(".curaflow").join("runs"))
    }

    pub fn runs_dir(&self) -> &PathBuf {
        &self.runs_dir
    }

    fn run_path(&self, id: RunId) -> PathBuf {
        self.runs_dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl RunStore for FilesystemRunStore {
    async fn save(&self, run: &PipelineRun) -> CuraflowResult<()> {
        let path = self.run_path(run.id);
        let json = serde_json::to_string_pretty(run).map_err(|e| CuraflowError::StoreError {
            message: format!("Failed to serialize run: {}", e),
        })?;

        // Write then rename so readers never see a half-written record
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CuraflowError::StoreError {
                message: format!("Failed to write run record: {}", e),
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CuraflowError::StoreError {
                message: format!("Failed to commit run record: {}", e),
            })?;

        Ok(())
    }

    async fn load(&self, id: RunId) -> CuraflowResult<Option<PipelineRun>> {
        let path = self.run_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CuraflowError::StoreError {
                message: format!("Failed to read run record: {}", e),
            })?;

        let run = serde_json::from_str(&content).map_err(|e| CuraflowError::StoreError {
            message: format!("Failed to parse run record {}: {}", path.display(), e),
        })?;

        Ok(Some(run))
    }

    async fn list(&self) -> CuraflowResult<Vec<PipelineRun>> {
        let mut runs = Vec::new();

        if !self.runs_dir.exists() {
            return Ok(runs);
        }

        let mut entries =
            tokio::fs::read_dir(&self.runs_dir)
                .await
                .map_err(|e| CuraflowError::StoreError {
                    message: format!("Failed to read runs directory: {}", e),
                })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            // Skip unreadable records instead of failing the listing
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<PipelineRun>(&content) {
                    Ok(run) => runs.push(run),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping run record"),
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping run record"),
            }
        }

        runs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(runs)
    }

    async fn remove(&self, id: RunId) -> CuraflowResult<()> {
        let path = self.run_path(id);
        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| CuraflowError::StoreError {
                    message: format!("Failed to remove run record: {}", e),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Context, ExecutionPlan, RunStatus, StageDefinition};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_run() -> PipelineRun {
        let plan = ExecutionPlan::new(
            "curation",
            vec![Arc::new(StageDefinition::new("subsample-first", "subsample"))],
            Duration::from_secs(1800),
        );
        PipelineRun::new(
            RunId::new(),
            &plan,
            Context::new().with("S3Input", "s3://bucket/data.csv"),
        )
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemRunStore::new(temp_dir.path().to_path_buf()).unwrap();

        let mut run = make_run();
        run.start_stage(0, "subsample-first");
        store.save(&run).await.unwrap();

        let loaded = store.load(run.id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(loaded.context.get("S3Input").unwrap(), "s3://bucket/data.csv");
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let mut run = make_run();

        {
            let store = FilesystemRunStore::default_store(temp_dir.path().to_path_buf()).unwrap();
            run.finish(RunStatus::Succeeded);
            store.save(&run).await.unwrap();
        }

        let store = FilesystemRunStore::default_store(temp_dir.path().to_path_buf()).unwrap();
        assert!(store.runs_dir().ends_with(".curaflow/runs"));
        let runs = store.list().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_list_skips_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemRunStore::new(temp_dir.path().to_path_buf()).unwrap();

        store.save(&make_run()).await.unwrap();
        std::fs::write(temp_dir.path().join("junk.json"), "{not json").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemRunStore::new(temp_dir.path().to_path_buf()).unwrap();

        let run = make_run();
        store.save(&run).await.unwrap();
        store.remove(run.id).await.unwrap();

        assert!(store.load(run.id).await.unwrap().is_none());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.runs, 0);
    }
}
