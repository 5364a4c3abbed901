//! In-process persistence backend.
//!
//! Stores `created_at` as `{seconds, nanoseconds}`. The outage and latency
//! switches let callers exercise the failure and deadline paths without a
//! real network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{Document, Persistence, Tables, WriteOp};
use crate::error::StoreError;
use crate::timestamp;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    reject_writes: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend being unreachable: every call fails.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Simulate the backend refusing writes; reads keep working.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.tables.read().collections.get(collection).map_or(0, |c| c.len())
    }

    async fn enter(&self, write: bool) -> Result<(), StoreError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        if write && self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("memory store is read-only".into()));
        }
        Ok(())
    }

    fn write(&self, ops: Vec<WriteOp>) -> Result<Vec<String>, StoreError> {
        self.tables.write().apply(ops, Utc::now(), timestamp::to_split)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.enter(false).await?;
        Ok(self.tables.read().get(collection, id))
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        self.enter(false).await?;
        Ok(self.tables.read().query(collection, field, value))
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        self.enter(true).await?;
        let ids = self.write(vec![WriteOp::create(collection, data)])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected("create produced no id".into()))
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<(), StoreError> {
        self.enter(true).await?;
        self.write(vec![WriteOp::update(collection, id, patch)]).map(|_| ())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.enter(true).await?;
        self.write(vec![WriteOp::delete(collection, id)]).map(|_| ())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<Vec<String>, StoreError> {
        self.enter(true).await?;
        self.write(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{CREATED_AT, TASKS};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let store = MemoryStore::new();
        let id = store.create(TASKS, doc(json!({"project_id": "p1", "content": "a"}))).await.unwrap();
        let stored = store.get(TASKS, &id).await.unwrap().unwrap();
        assert!(stored[CREATED_AT].get("seconds").is_some());

        store.update(TASKS, &id, doc(json!({"content": "b"}))).await.unwrap();
        let hits = store.query(TASKS, "project_id", &json!("p1")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1["content"], json!("b"));

        store.delete(TASKS, &id).await.unwrap();
        assert!(store.get(TASKS, &id).await.unwrap().is_none());
        store.delete(TASKS, &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_of_missing_document_fails() {
        let store = MemoryStore::new();
        let err = store.update(TASKS, "nope", Document::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_outage_and_rejection() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.get(TASKS, "x").await, Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        store.set_reject_writes(true);
        assert!(store.get(TASKS, "x").await.is_ok());
        assert!(matches!(store.create(TASKS, Document::new()).await, Err(StoreError::Rejected(_))));
        assert_eq!(store.len(TASKS), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_calls() {
        let store = MemoryStore::new();
        store.set_latency(Some(Duration::from_secs(3)));
        let started = tokio::time::Instant::now();
        store.get(TASKS, "x").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
