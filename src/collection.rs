//! In-memory task collection.
//!
//! `TaskCollection` holds the tasks of every loaded project, keyed by project
//! id. Within a project the vector order is the insertion order, which is also
//! the tie-break whenever two tasks of one column share an `order` value.

use std::collections::HashMap;

use crate::error::SyncError;
use crate::fields::Status;
use crate::task::{Task, TaskId, TaskPatch};

/// Tasks grouped into the four board columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    columns: [Vec<Task>; 4],
}

impl Columns {
    /// Group tasks by status, each column sorted by `order`. The sort is
    /// stable, so equal ranks keep their input order.
    pub fn group(tasks: &[Task]) -> Self {
        let mut columns: [Vec<Task>; 4] = Default::default();
        for t in tasks {
            columns[t.status.index()].push(t.clone());
        }
        for column in columns.iter_mut() {
            column.sort_by_key(|t| t.order);
        }
        Columns { columns }
    }

    pub fn column(&self, status: Status) -> &[Task] {
        &self.columns[status.index()]
    }

    /// Columns in board order; empty columns are included.
    pub fn iter(&self) -> impl Iterator<Item = (Status, &[Task])> {
        Status::ALL.into_iter().map(move |s| (s, self.column(s)))
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }
}

/// Assign `order = 0..n-1` per column following the sequence order of `tasks`.
pub fn assign_dense_orders(tasks: &mut [Task]) {
    let mut next = [0u32; 4];
    for t in tasks.iter_mut() {
        let slot = &mut next[t.status.index()];
        t.order = *slot;
        *slot += 1;
    }
}

/// Stable-sort into board sequence `(status, order)`, then re-densify.
pub fn renormalize(tasks: &mut Vec<Task>) {
    tasks.sort_by_key(|t| (t.status.index(), t.order));
    assign_dense_orders(tasks);
}

/// Per-project task store.
#[derive(Debug, Default, Clone)]
pub struct TaskCollection {
    projects: HashMap<String, Vec<Task>>,
}

impl TaskCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all tasks for a project, keeping only tasks that belong to it.
    pub fn set_all(&mut self, project_id: &str, tasks: Vec<Task>) {
        let tasks: Vec<Task> = tasks.into_iter().filter(|t| t.project_id == project_id).collect();
        self.projects.insert(project_id.to_string(), tasks);
    }

    /// Append a task. A duplicate id is a caller error.
    pub fn add(&mut self, project_id: &str, task: Task) -> Result<(), SyncError> {
        let tasks = self.projects.entry(project_id.to_string()).or_default();
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(SyncError::Validation(format!("duplicate task id {}", task.id)));
        }
        tasks.push(task);
        Ok(())
    }

    /// Re-insert a task at a former position (clamped to the end).
    pub fn insert_at(&mut self, project_id: &str, index: usize, task: Task) {
        let tasks = self.projects.entry(project_id.to_string()).or_default();
        if tasks.iter().any(|t| t.id == task.id) {
            return;
        }
        let index = index.min(tasks.len());
        tasks.insert(index, task);
    }

    /// Merge fields into an existing task. Unknown ids are ignored so that a
    /// stale patch never fails. Returns whether anything changed.
    pub fn patch(&mut self, project_id: &str, task_id: &str, patch: &TaskPatch) -> bool {
        match self.get_mut(project_id, task_id) {
            Some(t) => patch.apply(t),
            None => false,
        }
    }

    /// Delete by id, returning the former position and task if it existed.
    pub fn remove(&mut self, project_id: &str, task_id: &str) -> Option<(usize, Task)> {
        let tasks = self.projects.get_mut(project_id)?;
        let idx = tasks.iter().position(|t| t.id == task_id)?;
        Some((idx, tasks.remove(idx)))
    }

    /// Forget a project entirely.
    pub fn clear_project(&mut self, project_id: &str) {
        self.projects.remove(project_id);
    }

    /// Drop every project (session teardown).
    pub fn clear(&mut self) {
        self.projects.clear();
    }

    pub fn is_loaded(&self, project_id: &str) -> bool {
        self.projects.contains_key(project_id)
    }

    /// Tasks of a project in stored sequence.
    pub fn tasks(&self, project_id: &str) -> &[Task] {
        self.projects.get(project_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, project_id: &str, task_id: &str) -> Option<&Task> {
        self.tasks(project_id).iter().find(|t| t.id == task_id)
    }

    pub fn get_mut(&mut self, project_id: &str, task_id: &str) -> Option<&mut Task> {
        self.projects.get_mut(project_id)?.iter_mut().find(|t| t.id == task_id)
    }

    /// Column-grouped view; all four columns are always present.
    pub fn by_status(&self, project_id: &str) -> Columns {
        Columns::group(self.tasks(project_id))
    }

    /// Rank a new card would get at the end of `status`.
    pub fn next_order(&self, project_id: &str, status: Status) -> u32 {
        let n = self.tasks(project_id).iter().filter(|t| t.status == status).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Re-densify every column of a project.
    pub fn renormalize(&mut self, project_id: &str) {
        if let Some(tasks) = self.projects.get_mut(project_id) {
            renormalize(tasks);
        }
    }

    /// Swap a task's id (temporary → server-issued) and rewrite dependency
    /// references to it. Returns false if the old id is no longer present.
    pub fn rename(&mut self, project_id: &str, old_id: &str, new_id: &TaskId) -> bool {
        let Some(tasks) = self.projects.get_mut(project_id) else {
            return false;
        };
        let Some(task) = tasks.iter_mut().find(|t| t.id == old_id) else {
            return false;
        };
        task.id = new_id.clone();
        for t in tasks.iter_mut() {
            for dep in t.dependencies.iter_mut() {
                if dep == old_id {
                    *dep = new_id.clone();
                }
            }
            t.drop_self_dependency();
        }
        true
    }

    /// Resolve a task by exact id, id prefix, or case-insensitive title.
    pub fn resolve(&self, project_id: &str, identifier: &str) -> Result<&Task, SyncError> {
        if let Some(t) = self.get(project_id, identifier) {
            return Ok(t);
        }
        let needle = identifier.trim().to_lowercase();
        let matches: Vec<&Task> = self
            .tasks(project_id)
            .iter()
            .filter(|t| t.content.to_lowercase() == needle || (needle.len() >= 4 && t.id.starts_with(identifier)))
            .collect();
        match matches.as_slice() {
            [] => Err(SyncError::NotFound(format!("no task named '{identifier}'"))),
            [one] => Ok(one),
            many => {
                let mut msg = format!("multiple tasks match '{identifier}':");
                for t in many {
                    msg.push_str(&format!("\n  {} {} ({})", t.id, t.content, t.status.title()));
                }
                Err(SyncError::Validation(msg))
            }
        }
    }
}
