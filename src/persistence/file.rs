//! JSON-file persistence backend.
//!
//! One file per collection under the data directory (`projects.json`,
//! `tasks.json`), each a map of id to document. Writes go through a temp file
//! and a rename so a crash never leaves a half-written collection. Timestamps
//! are stored as RFC 3339 strings.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Document, Persistence, Tables, WriteOp};
use crate::error::StoreError;
use crate::timestamp;

/// File I/O runs on tokio's blocking pool so a slow disk never stalls the
/// runtime. A call that outlives the gateway deadline is reported as timed
/// out but still finishes in the background.
#[derive(Debug, Clone)]
pub struct FileStore {
    files: Arc<Files>,
}

#[derive(Debug)]
struct Files {
    dir: PathBuf,
    /// Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(FileStore { files: Arc::new(Files { dir: dir.to_path_buf(), lock: Mutex::new(()) }) })
    }

    pub fn dir(&self) -> &Path {
        &self.files.dir
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Files) -> Result<T, StoreError> + Send + 'static,
    {
        let files = self.files.clone();
        tokio::task::spawn_blocking(move || op(&files))
            .await
            .map_err(|e| StoreError::Unavailable(format!("file worker failed: {e}")))?
    }
}

impl Files {
    fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    /// Read one collection file. A missing file is an empty collection; an
    /// unreadable one is an error rather than a silent fresh start.
    fn load(&self, collection: &str) -> Result<BTreeMap<String, Document>, StoreError> {
        let path = self.path_for(collection);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let mut buf = String::new();
        File::open(&path)?.read_to_string(&mut buf)?;
        if buf.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&buf)?)
    }

    /// Write one collection file atomically (temp + rename).
    fn save(&self, collection: &str, docs: &BTreeMap<String, Document>) -> Result<(), StoreError> {
        let path = self.path_for(collection);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(docs)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn load_tables<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<Tables, StoreError> {
        let mut tables = Tables::default();
        for name in names {
            tables.collections.insert(name.to_string(), self.load(name)?);
        }
        Ok(tables)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load(collection)?.remove(id))
    }

    fn query(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<(String, Document)>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load_tables([collection])?.query(collection, field, value))
    }

    fn write(&self, ops: Vec<WriteOp>) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock();
        let touched: BTreeSet<String> = ops
            .iter()
            .map(|op| match op {
                WriteOp::Create { collection, .. }
                | WriteOp::Update { collection, .. }
                | WriteOp::Delete { collection, .. } => collection.clone(),
            })
            .collect();
        let mut tables = self.load_tables(touched.iter().map(String::as_str))?;
        let created = tables.apply(ops, Utc::now(), timestamp::to_rfc3339)?;
        for name in &touched {
            if let Some(docs) = tables.collections.get(name) {
                self.save(name, docs)?;
            }
        }
        Ok(created)
    }
}

#[async_trait]
impl Persistence for FileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.blocking(move |files| files.get(&collection, &id)).await
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let (collection, field, value) = (collection.to_string(), field.to_string(), value.clone());
        self.blocking(move |files| files.query(&collection, &field, &value)).await
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        self.batch_write(vec![WriteOp::create(collection, data)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected("create produced no id".into()))
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::update(collection, id, patch)]).await.map(|_| ())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::delete(collection, id)]).await.map(|_| ())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<Vec<String>, StoreError> {
        self.blocking(move |files| files.write(ops)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{CREATED_AT, PROJECTS, TASKS};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FileStore::open(dir.path()).unwrap();
            store.create(PROJECTS, doc(json!({"uid": "demo_user", "title": "Orbit"}))).await.unwrap()
        };
        let store = FileStore::open(dir.path()).unwrap();
        let project = store.get(PROJECTS, &id).await.unwrap().unwrap();
        assert_eq!(project["title"], json!("Orbit"));
        assert!(project[CREATED_AT].is_string());
        assert!(!dir.path().join("projects.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_batch_spans_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let ids = store
            .batch_write(vec![
                WriteOp::create(PROJECTS, doc(json!({"title": "A"}))),
                WriteOp::create(TASKS, doc(json!({"content": "t"}))),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(store.get(TASKS, &ids[1]).await.unwrap().is_some());

        let err = store
            .batch_write(vec![
                WriteOp::delete(TASKS, &ids[1]),
                WriteOp::update(PROJECTS, "missing", Document::new()),
            ])
            .await;
        assert!(err.is_err());
        assert!(store.get(TASKS, &ids[1]).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writes_are_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(TASKS, doc(json!({"projectId": "p1", "order": i}))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let stored = store.query(TASKS, "projectId", &json!("p1")).await.unwrap();
        assert_eq!(stored.len(), 16);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tasks.json"), "{not json").unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(store.get(TASKS, "x").await, Err(StoreError::Json(_))));
    }
}
