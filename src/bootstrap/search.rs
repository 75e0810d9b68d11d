// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Search-index service clients

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::{CuraflowError, CuraflowResult};

/// The external search service that hosts bootstrap indexes
#[async_trait]
pub trait SearchIndexService: Send + Sync {
    /// Create a vector index
    async fn create_index(&self, index: &str, dimension: u32) -> CuraflowResult<()>;

    /// Whether the index exists
    async fn index_exists(&self, index: &str) -> CuraflowResult<bool>;

    /// Delete the index
    async fn delete_index(&self, index: &str) -> CuraflowResult<()>;
}

/// k-NN index body: an embedding vector, the passage it was computed from
/// and a document id.
pub fn index_mapping(dimension: u32) -> serde_json::Value {
    serde_json::json!({
        "settings": {
            "index": { "knn": true }
        },
        "mappings": {
            "properties": {
                "embedding": { "type": "knn_vector", "dimension": dimension },
                "passage": { "type": "text" },
                "doc_id": { "type": "keyword" }
            }
        }
    })
}

/// OpenSearch-style REST client
pub struct HttpSearchIndex {
    client: Client,
    endpoint: String,
}

impl HttpSearchIndex {
    pub fn new(endpoint: impl Into<String>) -> CuraflowResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, index: &str) -> String {
        format!("{}/{}", self.endpoint, index)
    }
}

#[async_trait]
impl SearchIndexService for HttpSearchIndex {
    async fn create_index(&self, index: &str, dimension: u32) -> CuraflowResult<()> {
        let resp = self
            .client
            .put(self.url(index))
            .json(&index_mapping(dimension))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::info!(index, "search index created");
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_default();
        if text.contains("resource_already_exists_exception") {
            tracing::info!(index, "search index already exists");
            Ok(())
        } else {
            Err(CuraflowError::SearchService {
                message: format!("PUT /{} returned {}: {}", index, status, text),
            })
        }
    }

    async fn index_exists(&self, index: &str) -> CuraflowResult<bool> {
        let resp = self.client.head(self.url(index)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(CuraflowError::SearchService {
                message: format!("HEAD /{} returned {}", index, status),
            }),
        }
    }

    async fn delete_index(&self, index: &str) -> CuraflowResult<()> {
        let resp = self.client.delete(self.url(index)).send().await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::info!(index, "search index deleted");
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(CuraflowError::SearchService {
                message: format!("DELETE /{} returned {}: {}", index, status, text),
            })
        }
    }
}

/// Process-local search service
///
/// Counts every call so callers can check that bootstrap never issues
/// duplicate creations.
#[derive(Default)]
pub struct InMemorySearchIndex {
    indexes: Mutex<BTreeMap<String, u32>>,
    latency: Option<Duration>,
    failure: Mutex<Option<String>>,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, so concurrent callers overlap
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Start with an index already present
    #[must_use]
    pub fn with_index(self, index: &str, dimension: u32) -> Self {
        if let Ok(mut indexes) = self.indexes.lock() {
            indexes.insert(index.to_string(), dimension);
        }
        self
    }

    /// Make the next create call fail
    pub fn fail_next_create(&self, message: impl Into<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.into());
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn dimension_of(&self, index: &str) -> Option<u32> {
        self.indexes.lock().ok()?.get(index).copied()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn poisoned() -> CuraflowError {
        CuraflowError::SearchService {
            message: "in-memory index state poisoned".into(),
        }
    }
}

#[async_trait]
impl SearchIndexService for InMemorySearchIndex {
    async fn create_index(&self, index: &str, dimension: u32) -> CuraflowResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(message) = self.failure.lock().map_err(|_| Self::poisoned())?.take() {
            return Err(CuraflowError::SearchService { message });
        }

        self.indexes
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(index.to_string(), dimension);
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> CuraflowResult<bool> {
        self.simulate_latency().await;
        Ok(self
            .indexes
            .lock()
            .map_err(|_| Self::poisoned())?
            .contains_key(index))
    }

    async fn delete_index(&self, index: &str) -> CuraflowResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.indexes
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(index);
        Ok(())
    }
}
