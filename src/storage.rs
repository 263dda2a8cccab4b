//! Result persistence contract.
//!
//! The queue only needs three operations against storage: save a full
//! result, update a status, and fetch by id. [`crate::db::Db`] provides the
//! Postgres implementation; [`MemoryStore`] keeps everything in process for
//! tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{CrawlResult, CrawlStats, CrawlStatus, TaskId};

/// Storage backend for crawl results. Must be safe for concurrent use by
/// every worker at once.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace the record keyed by `result.id`.
    async fn save_result(&self, result: &CrawlResult) -> Result<()>;

    /// Set status and error text, refreshing `updated_at`.
    async fn update_status(
        &self,
        id: TaskId,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Fetch a record. Returns [`Error::NotFound`] when absent.
    async fn get_result(&self, id: TaskId) -> Result<CrawlResult>;
}

/// In-process result store.
#[derive(Default)]
pub struct MemoryStore {
    results: RwLock<HashMap<TaskId, CrawlResult>>,
    fail_saves: AtomicBool,
    fail_status_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save_result` fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `update_status` fail.
    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }

    pub async fn stats(&self) -> CrawlStats {
        let results = self.results.read().await;
        let mut stats = CrawlStats::default();
        for result in results.values() {
            stats.count(result.status);
        }
        stats
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_result(&self, result: &CrawlResult) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Other("memory store: save rejected".to_string()));
        }
        let mut results = self.results.write().await;
        let mut stored = result.clone();
        // Same upsert rule as Postgres: the original creation time sticks.
        if let Some(existing) = results.get(&result.id) {
            stored.created_at = existing.created_at;
        }
        results.insert(result.id, stored);
        Ok(())
    }

    async fn update_status(
        &self,
        id: TaskId,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(Error::Other(
                "memory store: status update rejected".to_string(),
            ));
        }
        let mut results = self.results.write().await;
        let result = results
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        result.status = status;
        result.error_message = error_message.map(str::to_string);
        result.updated_at = Utc::now();
        Ok(())
    }

    async fn get_result(&self, id: TaskId) -> Result<CrawlResult> {
        self.results
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
