//! Task data structures.
//!
//! This module defines the `Task` card held on a board together with the
//! `TaskDraft` used to create one and the `TaskPatch` used to change one.
//! All timestamps are already canonical (`DateTime<Utc>`): conversion from the
//! persistence layer's native shapes happens in the gateway, never here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::fields::{Priority, Status};

/// Opaque task identifier. Either server-issued or a temporary `tmp-` id.
pub type TaskId = String;

const TEMP_PREFIX: &str = "tmp-";

/// Generate a temporary client-side id for an optimistic create.
pub fn new_temp_id() -> TaskId {
    format!("{TEMP_PREFIX}{}", Uuid::new_v4())
}

/// Whether an id was generated locally and is still awaiting confirmation.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_PREFIX)
}

/// A card on a project's kanban board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: String,
    pub status: Status,
    /// Task title.
    pub content: String,
    #[serde(default)]
    pub description: String,
    /// Dense rank within the status column.
    pub order: u32,
    #[serde(default)]
    pub is_ai_generated: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,
}

impl Task {
    /// Build a task from a validated draft.
    pub fn from_draft(id: TaskId, project_id: &str, draft: TaskDraft, created_at: DateTime<Utc>) -> Self {
        let mut task = Task {
            id,
            project_id: project_id.to_string(),
            status: draft.status,
            content: draft.content.trim().to_string(),
            description: draft.description,
            order: draft.order.unwrap_or(0),
            is_ai_generated: draft.is_ai_generated,
            created_at,
            priority: draft.priority,
            due_date: draft.due_date,
            dependencies: draft.dependencies,
            assignee: draft.assignee,
            tags: draft.tags,
            estimated_hours: draft.estimated_hours,
            actual_hours: None,
        };
        task.drop_self_dependency();
        task
    }

    /// Remove the task's own id from its dependency list.
    pub fn drop_self_dependency(&mut self) {
        let id = self.id.clone();
        self.dependencies.retain(|d| *d != id);
    }
}

/// One entry of a bulk status/order patch: `{id, status?, order?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl TaskUpdate {
    /// The same change expressed as a patch.
    pub fn to_patch(&self) -> TaskPatch {
        TaskPatch { status: self.status, order: self.order, ..TaskPatch::default() }
    }
}

/// Fields for a task that does not exist yet.
///
/// `project_id` is optional so that bulk drafts (e.g. from document
/// extraction) can be validated one by one instead of failing wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub is_ai_generated: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

impl TaskDraft {
    /// A draft with just a title, landing in the `TODO` column.
    pub fn new(content: impl Into<String>) -> Self {
        TaskDraft { content: content.into(), ..TaskDraft::default() }
    }

    /// Check the required fields and return the owning project id.
    pub fn validate(&self) -> Result<&str, SyncError> {
        let project_id = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SyncError::Validation("project_id is required".into()))?;
        if self.content.trim().is_empty() {
            return Err(SyncError::Validation("content is required".into()));
        }
        Ok(project_id)
    }
}

/// Partial update of a task.
///
/// Doubly-optional fields distinguish "leave alone" (`None`) from "clear"
/// (`Some(None)`, `null` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, alias = "desc", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<TaskId>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<Option<f64>>,
}

/// Present-but-null becomes `Some(None)`; absent stays `None` via `default`.
pub(crate) fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        TaskPatch { status: Some(status), ..TaskPatch::default() }
    }

    pub fn position(status: Status, order: u32) -> Self {
        TaskPatch { status: Some(status), order: Some(order), ..TaskPatch::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Reject patches that would break a task invariant.
    pub fn validate_for(&self, task_id: &str) -> Result<(), SyncError> {
        if let Some(content) = &self.content {
            if content.trim().is_empty() {
                return Err(SyncError::Validation("content cannot be empty".into()));
            }
        }
        if let Some(deps) = &self.dependencies {
            if deps.iter().any(|d| d == task_id) {
                return Err(SyncError::Validation(format!("task {task_id} cannot depend on itself")));
            }
        }
        Ok(())
    }

    /// Merge the patch into `task`. Returns whether anything changed.
    pub fn apply(&self, task: &mut Task) -> bool {
        let before = task.clone();
        if let Some(s) = self.status {
            task.status = s;
        }
        if let Some(o) = self.order {
            task.order = o;
        }
        if let Some(c) = &self.content {
            task.content = c.trim().to_string();
        }
        if let Some(d) = &self.description {
            task.description = d.clone();
        }
        if let Some(p) = self.priority {
            task.priority = p;
        }
        if let Some(d) = self.due_date {
            task.due_date = d;
        }
        if let Some(deps) = &self.dependencies {
            task.dependencies = deps.clone();
        }
        if let Some(a) = &self.assignee {
            task.assignee = a.clone();
        }
        if let Some(t) = &self.tags {
            task.tags = t.clone();
        }
        if let Some(h) = self.estimated_hours {
            task.estimated_hours = h;
        }
        if let Some(h) = self.actual_hours {
            task.actual_hours = h;
        }
        task.drop_self_dependency();
        *task != before
    }

    /// The patch that restores `task`'s current values for every field this
    /// patch touches.
    pub fn inverse_for(&self, task: &Task) -> TaskPatch {
        TaskPatch {
            status: self.status.map(|_| task.status),
            order: self.order.map(|_| task.order),
            content: self.content.as_ref().map(|_| task.content.clone()),
            description: self.description.as_ref().map(|_| task.description.clone()),
            priority: self.priority.map(|_| task.priority),
            due_date: self.due_date.map(|_| task.due_date),
            dependencies: self.dependencies.as_ref().map(|_| task.dependencies.clone()),
            assignee: self.assignee.as_ref().map(|_| task.assignee.clone()),
            tags: self.tags.as_ref().map(|_| task.tags.clone()),
            estimated_hours: self.estimated_hours.map(|_| task.estimated_hours),
            actual_hours: self.actual_hours.map(|_| task.actual_hours),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample(id: &str, project_id: &str, status: Status, order: u32) -> Task {
    Task {
        id: id.to_string(),
        project_id: project_id.to_string(),
        status,
        content: format!("task {id}"),
        description: String::new(),
        order,
        is_ai_generated: false,
        created_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        priority: None,
        due_date: None,
        dependencies: Vec::new(),
        assignee: None,
        tags: Vec::new(),
        estimated_hours: None,
        actual_hours: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_validation() {
        let mut draft = TaskDraft::new("Write launch plan");
        assert!(matches!(draft.validate(), Err(SyncError::Validation(_))));
        draft.project_id = Some("p1".into());
        assert_eq!(draft.validate().unwrap(), "p1");
        draft.content = "   ".into();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_self_dependency_is_stripped() {
        let mut draft = TaskDraft::new("x");
        draft.dependencies = vec!["t1".into(), "t2".into()];
        let task = Task::from_draft("t1".into(), "p1", draft, Utc::now());
        assert_eq!(task.dependencies, vec!["t2".to_string()]);

        let patch = TaskPatch { dependencies: Some(vec!["t1".into()]), ..TaskPatch::default() };
        assert!(patch.validate_for("t1").is_err());
        assert!(patch.validate_for("t9").is_ok());
    }

    #[test]
    fn test_identical_patch_changes_nothing() {
        let mut task = sample("t1", "p1", Status::Todo, 3);
        let before = serde_json::to_vec(&task).unwrap();
        let patch = TaskPatch {
            status: Some(Status::Todo),
            order: Some(3),
            content: Some(task.content.clone()),
            priority: Some(None),
            ..TaskPatch::default()
        };
        assert!(!patch.apply(&mut task));
        assert_eq!(serde_json::to_vec(&task).unwrap(), before);
    }

    #[test]
    fn test_inverse_restores_touched_fields() {
        let original = sample("t1", "p1", Status::Todo, 0);
        let mut task = original.clone();
        let patch = TaskPatch {
            status: Some(Status::Done),
            assignee: Some(Some("kim".into())),
            ..TaskPatch::default()
        };
        let inverse = patch.inverse_for(&task);
        assert!(patch.apply(&mut task));
        assert!(inverse.apply(&mut task));
        assert_eq!(task, original);
    }

    #[test]
    fn test_patch_null_clears_and_unknown_fields_are_rejected() {
        let patch: TaskPatch = serde_json::from_str(r#"{"priority": null, "order": 2}"#).unwrap();
        assert_eq!(patch.priority, Some(None));
        assert_eq!(patch.order, Some(2));
        assert_eq!(patch.assignee, None);
        assert!(serde_json::from_str::<TaskPatch>(r#"{"owner": "x"}"#).is_err());
    }

    #[test]
    fn test_draft_defaults_to_todo() {
        assert_eq!(TaskDraft::new("x").status, Status::Todo);
        let draft: TaskDraft = serde_json::from_str(r#"{"content": "x", "project_id": "p1"}"#).unwrap();
        assert_eq!(draft.status, Status::Todo);
    }

    #[test]
    fn test_temp_ids() {
        let id = new_temp_id();
        assert!(is_temp_id(&id));
        assert!(!is_temp_id("3f2a"));
    }
}
