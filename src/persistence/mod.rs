//! Persistence collaborator.
//!
//! The board only needs a document store exposing six operations over named
//! collections: get by id, query by field equality, create (server-assigned
//! id), merge-update, delete and an all-or-nothing batch write. `Persistence`
//! is that interface; `MemoryStore` and `FileStore` implement it, and
//! `open_backend` picks one once per session.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{BackendKind, Config};
use crate::error::StoreError;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// A stored record: a flat JSON object.
pub type Document = Map<String, Value>;

pub const PROJECTS: &str = "projects";
pub const TASKS: &str = "tasks";

/// Field stamped by `create` when the caller did not provide one.
pub const CREATED_AT: &str = "created_at";

/// One operation of a batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Create { collection: String, data: Document },
    Update { collection: String, id: String, patch: Document },
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn create(collection: &str, data: Document) -> Self {
        WriteOp::Create { collection: collection.to_string(), data }
    }

    pub fn update(collection: &str, id: &str, patch: Document) -> Self {
        WriteOp::Update { collection: collection.to_string(), id: id.to_string(), patch }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        WriteOp::Delete { collection: collection.to_string(), id: id.to_string() }
    }
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Fetch one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// All documents whose `field` equals `value`, as `(id, document)` pairs.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, Document)>, StoreError>;

    /// Insert a document and return its new id.
    async fn create(&self, collection: &str, data: Document) -> Result<String, StoreError>;

    /// Merge top-level fields into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<(), StoreError>;

    /// Remove a document. Deleting a missing id succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Apply every op or none. Returns the ids of created documents in op order.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<Vec<String>, StoreError>;
}

/// Select the backend for a session.
pub fn open_backend(config: &Config) -> Result<Arc<dyn Persistence>, StoreError> {
    let backend: Arc<dyn Persistence> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::File => Arc::new(FileStore::open(&config.data_dir)?),
    };
    tracing::info!("Opened {:?} persistence backend", config.backend);
    Ok(backend)
}

/// Collections as plain maps, shared by both backends.
#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    pub(crate) collections: BTreeMap<String, BTreeMap<String, Document>>,
}

impl Tables {
    pub(crate) fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections.get(collection)?.get(id).cloned()
    }

    pub(crate) fn query(&self, collection: &str, field: &str, value: &Value) -> Vec<(String, Document)> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| doc.get(field) == Some(value))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check that a batch can be applied in full.
    fn check(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        for op in ops {
            if let WriteOp::Update { collection, id, .. } = op {
                let pending_delete = ops.iter().any(|o| {
                    matches!(o, WriteOp::Delete { collection: c, id: i } if c == collection && i == id)
                });
                if pending_delete || self.get(collection, id).is_none() {
                    return Err(StoreError::NotFound { collection: collection.clone(), id: id.clone() });
                }
            }
        }
        Ok(())
    }

    /// Validate then apply a batch. `stamp` encodes `created_at` in the
    /// backend's native shape.
    pub(crate) fn apply(
        &mut self,
        ops: Vec<WriteOp>,
        now: DateTime<Utc>,
        stamp: fn(DateTime<Utc>) -> Value,
    ) -> Result<Vec<String>, StoreError> {
        self.check(&ops)?;
        let mut created = Vec::new();
        for op in ops {
            match op {
                WriteOp::Create { collection, mut data } => {
                    let id = Uuid::new_v4().to_string();
                    if !data.contains_key(CREATED_AT) {
                        data.insert(CREATED_AT.to_string(), stamp(now));
                    }
                    self.collections.entry(collection).or_default().insert(id.clone(), data);
                    created.push(id);
                }
                WriteOp::Update { collection, id, patch } => {
                    if let Some(doc) = self.collections.get_mut(&collection).and_then(|c| c.get_mut(&id)) {
                        for (k, v) in patch {
                            doc.insert(k, v);
                        }
                    }
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = self.collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(created)
    }
}
