//! Sync gateway.
//!
//! Translates board intents into persistence calls and decodes what comes back
//! into typed records. This is the only place that sees stored documents:
//! field names follow the wire format (`desc`, `uid`, `project_id`), native
//! timestamp shapes are normalised here, and records that do not fit the
//! schema are rejected here. Every call runs under the configured deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{StoreError, SyncError};
use crate::extract::TaskExtractor;
use crate::fields::{Priority, Status, DEFAULT_CATEGORY};
use crate::persistence::{Document, Persistence, WriteOp, PROJECTS, TASKS};
use crate::project::{Project, ProjectDraft, ProjectPatch, DEFAULT_SCALE, MAX_SCALE, MIN_SCALE};
use crate::task::{Task, TaskDraft, TaskId, TaskPatch, TaskUpdate};
use crate::timestamp;

/// Outcome of a batch task creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Ids of the created tasks, in draft order.
    pub created: Vec<TaskId>,
    /// Drafts dropped for missing `project_id` or `content`.
    pub skipped: usize,
}

/// Outcome of a project launch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLaunch {
    pub project: Project,
    pub tasks_created: usize,
    pub tasks_skipped: usize,
}

/// Stored task shape. Missing fields take the defaults the board has always
/// used; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct TaskRecord {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    status: Status,
    #[serde(default)]
    content: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    is_ai_generated: bool,
    #[serde(default)]
    order: Option<f64>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    due_date: Option<Value>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    estimated_hours: Option<f64>,
    #[serde(default)]
    actual_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProjectRecord {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    scale: Option<f64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    created_at: Option<Value>,
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn created_at(value: Option<&Value>) -> DateTime<Utc> {
    timestamp::normalize(value).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn decode_task(id: &str, doc: Document) -> Result<Task, SyncError> {
    let record: TaskRecord = serde_json::from_value(Value::Object(doc))
        .map_err(|e| SyncError::Persistence(format!("task {id} is malformed: {e}")))?;
    let mut task = Task {
        id: id.to_string(),
        project_id: record.project_id,
        status: record.status,
        content: record.content,
        description: record.desc,
        order: record.order.map_or(0, |o| o.max(0.0).round() as u32),
        is_ai_generated: record.is_ai_generated,
        created_at: created_at(record.created_at.as_ref()),
        priority: record.priority,
        due_date: timestamp::normalize(record.due_date.as_ref()),
        dependencies: record.dependencies.unwrap_or_default(),
        assignee: record.assignee.filter(|a| !a.trim().is_empty()),
        tags: record.tags.unwrap_or_default(),
        estimated_hours: record.estimated_hours,
        actual_hours: record.actual_hours,
    };
    task.drop_self_dependency();
    Ok(task)
}

pub(crate) fn decode_project(id: &str, doc: Document) -> Result<Project, SyncError> {
    let record: ProjectRecord = serde_json::from_value(Value::Object(doc))
        .map_err(|e| SyncError::Persistence(format!("project {id} is malformed: {e}")))?;
    let scale = record
        .scale
        .map_or(DEFAULT_SCALE, |s| s.round().clamp(f64::from(MIN_SCALE), f64::from(MAX_SCALE)) as u8);
    Ok(Project {
        id: id.to_string(),
        owner_id: record.uid,
        title: record.title,
        category: record
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        scale,
        color: record.color.filter(|c| !c.trim().is_empty()),
        summary: record.summary,
        created_at: created_at(record.created_at.as_ref()),
    })
}

fn task_document(project_id: &str, draft: &TaskDraft) -> Document {
    let mut doc = object(json!({
        "project_id": project_id,
        "content": draft.content.trim(),
        "desc": draft.description,
        "status": draft.status,
        "is_ai_generated": draft.is_ai_generated,
        "order": draft.order.unwrap_or(0),
        "dependencies": draft.dependencies,
        "tags": draft.tags,
    }));
    if let Some(p) = draft.priority {
        doc.insert("priority".into(), json!(p));
    }
    if let Some(d) = draft.due_date {
        doc.insert("due_date".into(), timestamp::to_rfc3339(d));
    }
    if let Some(a) = &draft.assignee {
        doc.insert("assignee".into(), json!(a));
    }
    if let Some(h) = draft.estimated_hours {
        doc.insert("estimated_hours".into(), json!(h));
    }
    doc
}

fn task_patch_document(patch: &TaskPatch) -> Result<Document, SyncError> {
    let value = serde_json::to_value(patch).map_err(|e| SyncError::Validation(e.to_string()))?;
    let mut doc = object(value);
    if let Some(desc) = doc.remove("description") {
        doc.insert("desc".into(), desc);
    }
    if let Some(content) = &patch.content {
        doc.insert("content".into(), json!(content.trim()));
    }
    Ok(doc)
}

fn update_document(update: &TaskUpdate) -> Document {
    let mut doc = Document::new();
    if let Some(s) = update.status {
        doc.insert("status".into(), json!(s));
    }
    if let Some(o) = update.order {
        doc.insert("order".into(), json!(o));
    }
    doc
}

fn project_document(draft: &ProjectDraft) -> Document {
    let mut doc = object(json!({
        "uid": draft.uid.trim(),
        "title": draft.title.trim(),
        "category": draft.category_or_default(),
        "scale": draft.scale_or_default(),
        "summary": draft.summary,
    }));
    if let Some(c) = &draft.color {
        doc.insert("color".into(), json!(c));
    }
    doc
}

pub struct SyncGateway {
    store: Arc<dyn Persistence>,
    timeout: Duration,
    extractor: Option<Arc<dyn TaskExtractor>>,
}

impl SyncGateway {
    pub fn new(store: Arc<dyn Persistence>, timeout: Duration) -> Self {
        SyncGateway { store, timeout, extractor: None }
    }

    /// Attach the collaborator used to seed launched projects from documents.
    pub fn with_extractor(mut self, extractor: Arc<dyn TaskExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn guarded<T, F>(&self, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(self.timeout)),
        }
    }

    // ---------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------

    /// Projects owned by `uid`, newest first. Malformed records are skipped.
    pub async fn list_projects(&self, uid: &str) -> Result<Vec<Project>, SyncError> {
        if uid.trim().is_empty() {
            return Err(SyncError::Validation("uid is required".into()));
        }
        let docs = self.guarded(self.store.query(PROJECTS, "uid", &json!(uid))).await?;
        let mut projects: Vec<Project> = docs
            .into_iter()
            .filter_map(|(id, doc)| match decode_project(&id, doc) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!("Skipping project record: {}", e);
                    None
                }
            })
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    pub async fn get_project(&self, id: &str) -> Result<Project, SyncError> {
        match self.guarded(self.store.get(PROJECTS, id)).await? {
            Some(doc) => decode_project(id, doc),
            None => Err(SyncError::NotFound(format!("project {id}"))),
        }
    }

    pub async fn get_project_with_tasks(&self, id: &str) -> Result<(Project, Vec<Task>), SyncError> {
        let project = self.get_project(id).await?;
        let tasks = self.list_tasks(id).await?;
        Ok((project, tasks))
    }

    /// Launch a project. Document text, when present, goes through the
    /// extractor first; extraction failures are logged and the project is
    /// created anyway. Extracted drafts are batch-created afterwards.
    pub async fn create_project(&self, mut draft: ProjectDraft) -> Result<ProjectLaunch, SyncError> {
        draft.validate()?;

        let mut extracted: Vec<TaskDraft> = Vec::new();
        let text = draft.document_text.clone().filter(|t| !t.trim().is_empty());
        if let Some(text) = text {
            match &self.extractor {
                Some(extractor) => match tokio::time::timeout(self.timeout, extractor.extract(&text)).await {
                    Ok(Ok(found)) => {
                        if draft.summary.trim().is_empty() {
                            draft.summary = found.summary;
                        }
                        extracted = found.tasks;
                    }
                    Ok(Err(e)) => tracing::warn!("Task extraction failed, launching without tasks: {}", e),
                    Err(_) => tracing::warn!("Task extraction timed out, launching without tasks"),
                },
                None => tracing::warn!("No extractor configured, ignoring document text"),
            }
        }

        let id = self.guarded(self.store.create(PROJECTS, project_document(&draft))).await?;
        let project = self.get_project(&id).await?;
        tracing::info!("Created project {} ({})", project.title, project.id);

        let mut launch = ProjectLaunch { project, tasks_created: 0, tasks_skipped: 0 };
        if extracted.is_empty() {
            return Ok(launch);
        }
        let total = extracted.len();
        for d in extracted.iter_mut() {
            d.project_id = Some(id.clone());
            d.is_ai_generated = true;
        }
        match self.create_tasks(extracted).await {
            Ok(batch) => {
                launch.tasks_created = batch.created.len();
                launch.tasks_skipped = batch.skipped;
            }
            Err(e) => {
                tracing::warn!("Seeding tasks for project {} failed: {}", id, e);
                launch.tasks_skipped = total;
            }
        }
        Ok(launch)
    }

    pub async fn patch_project(&self, id: &str, patch: &ProjectPatch) -> Result<(), SyncError> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        let value = serde_json::to_value(patch).map_err(|e| SyncError::Validation(e.to_string()))?;
        self.guarded(self.store.update(PROJECTS, id, object(value))).await
    }

    /// Delete a project and every task that references it. Tasks go first;
    /// if that fails the project is left in place. Returns the number of
    /// tasks removed.
    pub async fn delete_project(&self, id: &str) -> Result<usize, SyncError> {
        let tasks = self.guarded(self.store.query(TASKS, "project_id", &json!(id))).await?;
        let count = tasks.len();
        if count > 0 {
            let ops = tasks.iter().map(|(task_id, _)| WriteOp::delete(TASKS, task_id)).collect();
            if let Err(e) = self.guarded(self.store.batch_write(ops)).await {
                tracing::error!("Deleting tasks of project {} failed, project kept: {}", id, e);
                return Err(e);
            }
        }
        self.guarded(self.store.delete(PROJECTS, id)).await?;
        tracing::info!("Deleted project {} with {} tasks", id, count);
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    /// Tasks of a project by ascending `order`. Malformed records are skipped.
    pub async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, SyncError> {
        if project_id.trim().is_empty() {
            return Err(SyncError::Validation("project_id is required".into()));
        }
        let docs = self.guarded(self.store.query(TASKS, "project_id", &json!(project_id))).await?;
        let mut tasks: Vec<Task> = docs
            .into_iter()
            .filter_map(|(id, doc)| match decode_task(&id, doc) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!("Skipping task record: {}", e);
                    None
                }
            })
            .collect();
        tasks.sort_by_key(|t| t.order);
        Ok(tasks)
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, SyncError> {
        match self.guarded(self.store.get(TASKS, id)).await? {
            Some(doc) => decode_task(id, doc),
            None => Err(SyncError::NotFound(format!("task {id}"))),
        }
    }

    /// Create one task and return it as stored.
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, SyncError> {
        let project_id = draft.validate()?;
        let id = self.guarded(self.store.create(TASKS, task_document(project_id, draft))).await?;
        tracing::debug!("Created task {} in project {}", id, project_id);
        match self.get_task(&id).await {
            Ok(task) => Ok(task),
            Err(SyncError::NotFound(_)) => Ok(Task::from_draft(id, project_id, draft.clone(), Utc::now())),
            Err(e) => Err(e),
        }
    }

    /// Create many tasks in one batch. Invalid drafts are skipped and counted;
    /// they never abort the batch.
    pub async fn create_tasks(&self, drafts: Vec<TaskDraft>) -> Result<BatchResult, SyncError> {
        let mut ops = Vec::with_capacity(drafts.len());
        let mut skipped = 0;
        for draft in &drafts {
            match draft.validate() {
                Ok(project_id) => ops.push(WriteOp::create(TASKS, task_document(project_id, draft))),
                Err(e) => {
                    tracing::warn!("Skipping task draft '{}': {}", draft.content, e);
                    skipped += 1;
                }
            }
        }
        if ops.is_empty() {
            return Ok(BatchResult { created: Vec::new(), skipped });
        }
        let created = self.guarded(self.store.batch_write(ops)).await?;
        Ok(BatchResult { created, skipped })
    }

    /// Persist status and order changes in one batch.
    pub async fn bulk_patch_tasks(&self, updates: &[TaskUpdate]) -> Result<(), SyncError> {
        let ops: Vec<WriteOp> = updates
            .iter()
            .map(|u| (u, update_document(u)))
            .filter(|(_, doc)| !doc.is_empty())
            .map(|(u, doc)| WriteOp::update(TASKS, &u.id, doc))
            .collect();
        if ops.is_empty() {
            return Ok(());
        }
        self.guarded(self.store.batch_write(ops)).await.map(|_| ())
    }

    pub async fn patch_task(&self, id: &str, patch: &TaskPatch) -> Result<(), SyncError> {
        patch.validate_for(id)?;
        if patch.is_empty() {
            return Ok(());
        }
        let doc = task_patch_document(patch)?;
        self.guarded(self.store.update(TASKS, id, doc)).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), SyncError> {
        self.guarded(self.store.delete(TASKS, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::OutlineExtractor;
    use crate::persistence::MemoryStore;

    fn gateway() -> (Arc<MemoryStore>, SyncGateway) {
        let store = Arc::new(MemoryStore::new());
        let gw = SyncGateway::new(store.clone(), Duration::from_secs(5));
        (store, gw)
    }

    fn draft(project_id: &str, content: &str) -> TaskDraft {
        TaskDraft { project_id: Some(project_id.into()), ..TaskDraft::new(content) }
    }

    #[tokio::test]
    async fn test_batch_create_skips_invalid_drafts() {
        let (_, gw) = gateway();
        let result = gw.create_tasks(vec![draft("p1", "x"), draft("p1", "")]).await.unwrap();
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(gw.list_tasks("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_project_cascades_to_tasks() {
        let (store, gw) = gateway();
        let launch = gw.create_project(ProjectDraft::new("demo_user", "Orbit")).await.unwrap();
        let pid = launch.project.id.clone();
        gw.create_tasks(vec![draft(&pid, "a"), draft(&pid, "b"), draft("other", "c")]).await.unwrap();

        assert_eq!(gw.delete_project(&pid).await.unwrap(), 2);
        assert!(gw.list_tasks(&pid).await.unwrap().is_empty());
        assert!(matches!(gw.get_project(&pid).await, Err(SyncError::NotFound(_))));
        assert_eq!(store.len(TASKS), 1);
    }

    #[tokio::test]
    async fn test_failed_task_cascade_keeps_project() {
        let (store, gw) = gateway();
        let pid = gw.create_project(ProjectDraft::new("demo_user", "Orbit")).await.unwrap().project.id;
        gw.create_task(&draft(&pid, "a")).await.unwrap();

        store.set_reject_writes(true);
        assert!(matches!(gw.delete_project(&pid).await, Err(SyncError::Persistence(_))));
        store.set_reject_writes(false);
        assert!(gw.get_project(&pid).await.is_ok());
        assert_eq!(gw.list_tasks(&pid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_native_timestamps_are_normalized_on_read() {
        let (store, gw) = gateway();
        let doc = object(json!({
            "project_id": "p1",
            "content": "legacy",
            "created_at": {"_seconds": 1_767_225_600i64, "_nanoseconds": 0},
            "due_date": 1_767_312_000_000i64,
        }));
        let id = store.create(TASKS, doc).await.unwrap();
        let task = gw.get_task(&id).await.unwrap();
        assert_eq!(task.created_at, DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap());
        assert_eq!(task.due_date, DateTime::<Utc>::from_timestamp(1_767_312_000, 0));
        assert_eq!(task.status, Status::Todo);

        let created = gw.create_task(&draft("p1", "fresh")).await.unwrap();
        assert!(created.created_at > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped_in_lists() {
        let (store, gw) = gateway();
        store.create(TASKS, object(json!({"project_id": "p1", "status": "BLOCKED"}))).await.unwrap();
        store.create(TASKS, object(json!({"project_id": "p1", "content": "ok", "order": 2.0}))).await.unwrap();
        let tasks = gw.list_tasks("p1").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].order, 2);
    }

    #[tokio::test]
    async fn test_bulk_patch_persists_status_and_order() {
        let (_, gw) = gateway();
        let t = gw.create_task(&draft("p1", "a")).await.unwrap();
        gw.bulk_patch_tasks(&[TaskUpdate { id: t.id.clone(), status: Some(Status::Done), order: Some(4) }])
            .await
            .unwrap();
        let stored = gw.get_task(&t.id).await.unwrap();
        assert_eq!((stored.status, stored.order), (Status::Done, 4));
    }

    #[tokio::test]
    async fn test_patch_task_writes_wire_names_and_clears() {
        let (store, gw) = gateway();
        let mut d = draft("p1", "a");
        d.assignee = Some("kim".into());
        let t = gw.create_task(&d).await.unwrap();
        let patch: TaskPatch = serde_json::from_value(json!({"description": "notes", "assignee": null})).unwrap();
        gw.patch_task(&t.id, &patch).await.unwrap();
        let raw = store.get(TASKS, &t.id).await.unwrap().unwrap();
        assert_eq!(raw["desc"], json!("notes"));
        assert!(!raw.contains_key("description"));
        assert_eq!(gw.get_task(&t.id).await.unwrap().assignee, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Some(Duration::from_secs(30)));
        let gw = SyncGateway::new(store, Duration::from_secs(2));
        assert!(matches!(gw.list_tasks("p1").await, Err(SyncError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_launch_seeds_tasks_from_document() {
        let store = Arc::new(MemoryStore::new());
        let gw = SyncGateway::new(store, Duration::from_secs(5)).with_extractor(Arc::new(OutlineExtractor::new()));
        let mut form = ProjectDraft::new("demo_user", "Beta");
        form.document_text = Some("Ship it.\n\n- one\n- two\n".into());
        let launch = gw.create_project(form).await.unwrap();
        assert_eq!(launch.tasks_created, 2);
        assert_eq!(launch.project.summary, "Ship it.");
        let tasks = gw.list_tasks(&launch.project.id).await.unwrap();
        assert!(tasks.iter().all(|t| t.is_ai_generated));
        assert_eq!(gw.list_projects("demo_user").await.unwrap().len(), 1);
    }

    struct BrokenExtractor;

    #[async_trait::async_trait]
    impl TaskExtractor for BrokenExtractor {
        async fn extract(&self, _text: &str) -> Result<crate::extract::Extraction, crate::extract::ExtractError> {
            Err(crate::extract::ExtractError::Failed("model unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_launch_survives_extractor_failure() {
        let (_, gw) = gateway();
        let gw = gw.with_extractor(Arc::new(BrokenExtractor));
        let mut form = ProjectDraft::new("demo_user", "Beta");
        form.document_text = Some("- one".into());
        let launch = gw.create_project(form).await.unwrap();
        assert_eq!(launch.tasks_created, 0);
        assert!(gw.get_project(&launch.project.id).await.is_ok());
        assert!(gw.create_project(ProjectDraft::new("demo_user", " ")).await.unwrap_err().is_validation());
    }
}
