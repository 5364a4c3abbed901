//! Projects ("planets") and the registry of loaded projects.
//!
//! A project owns a kanban board of tasks. The registry mirrors
//! `TaskCollection`'s contract for projects and keeps the two in step: removing
//! a project always clears its tasks as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::TaskCollection;
use crate::error::SyncError;
use crate::fields::{category_color, DEFAULT_CATEGORY};
use crate::task::double_option;

pub const MIN_SCALE: u8 = 1;
pub const MAX_SCALE: u8 = 10;
pub const DEFAULT_SCALE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    /// Owning user id.
    #[serde(rename = "uid")]
    pub owner_id: String,
    pub title: String,
    pub category: String,
    /// Visual size only, 1-10.
    pub scale: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn from_draft(id: String, draft: &ProjectDraft, created_at: DateTime<Utc>) -> Self {
        Project {
            id,
            owner_id: draft.uid.trim().to_string(),
            title: draft.title.trim().to_string(),
            category: draft.category_or_default(),
            scale: draft.scale_or_default(),
            color: draft.color.clone(),
            summary: draft.summary.clone(),
            created_at,
        }
    }

    /// Explicit color, or the category's palette entry.
    pub fn display_color(&self) -> &str {
        self.color.as_deref().unwrap_or_else(|| category_color(&self.category))
    }
}

fn check_scale(scale: i64) -> Result<u8, SyncError> {
    u8::try_from(scale)
        .ok()
        .filter(|s| (MIN_SCALE..=MAX_SCALE).contains(s))
        .ok_or_else(|| SyncError::Validation(format!("scale must be between {MIN_SCALE} and {MAX_SCALE}")))
}

/// The launch form: everything needed to create a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDraft {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub scale: Option<i64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub summary: String,
    /// Source document to extract a summary and seed tasks from.
    #[serde(default, alias = "documentText", skip_serializing_if = "Option::is_none")]
    pub document_text: Option<String>,
}

impl ProjectDraft {
    pub fn new(uid: impl Into<String>, title: impl Into<String>) -> Self {
        ProjectDraft { uid: uid.into(), title: title.into(), ..ProjectDraft::default() }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.uid.trim().is_empty() {
            return Err(SyncError::Validation("uid is required".into()));
        }
        if self.title.trim().is_empty() {
            return Err(SyncError::Validation("title is required".into()));
        }
        if let Some(scale) = self.scale {
            check_scale(scale)?;
        }
        Ok(())
    }

    pub fn category_or_default(&self) -> String {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string()
    }

    pub fn scale_or_default(&self) -> u8 {
        self.scale.and_then(|s| check_scale(s).ok()).unwrap_or(DEFAULT_SCALE)
    }
}

/// Partial update of a project (inline edits such as recolouring).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<i64>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ProjectPatch {
    pub fn color(color: Option<String>) -> Self {
        ProjectPatch { color: Some(color), ..ProjectPatch::default() }
    }

    pub fn title(title: impl Into<String>) -> Self {
        ProjectPatch { title: Some(title.into()), ..ProjectPatch::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == ProjectPatch::default()
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(SyncError::Validation("title cannot be empty".into()));
            }
        }
        if let Some(scale) = self.scale {
            check_scale(scale)?;
        }
        Ok(())
    }

    /// Fold a later patch into this one; later fields win.
    pub fn merge(&mut self, later: ProjectPatch) {
        if later.title.is_some() {
            self.title = later.title;
        }
        if later.category.is_some() {
            self.category = later.category;
        }
        if later.scale.is_some() {
            self.scale = later.scale;
        }
        if later.color.is_some() {
            self.color = later.color;
        }
        if later.summary.is_some() {
            self.summary = later.summary;
        }
    }

    /// Merge into `project`. Returns whether anything changed.
    pub fn apply(&self, project: &mut Project) -> bool {
        let before = project.clone();
        if let Some(t) = &self.title {
            project.title = t.trim().to_string();
        }
        if let Some(c) = &self.category {
            project.category = c.clone();
        }
        if let Some(s) = self.scale.and_then(|s| check_scale(s).ok()) {
            project.scale = s;
        }
        if let Some(c) = &self.color {
            project.color = c.clone();
        }
        if let Some(s) = &self.summary {
            project.summary = s.clone();
        }
        *project != before
    }
}

/// The loaded projects of the active identity, newest first.
#[derive(Debug, Default, Clone)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
    selected: Option<String>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list after a full fetch.
    pub fn set_all(&mut self, mut projects: Vec<Project>) {
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.projects = projects;
        if let Some(sel) = &self.selected {
            if self.get(sel).is_none() {
                self.selected = None;
            }
        }
    }

    /// Insert a new project at the front. A duplicate id is a caller error.
    pub fn add(&mut self, project: Project) -> Result<(), SyncError> {
        if self.get(&project.id).is_some() {
            return Err(SyncError::Validation(format!("duplicate project id {}", project.id)));
        }
        self.projects.insert(0, project);
        Ok(())
    }

    /// Merge fields into a loaded project; unknown ids are ignored.
    pub fn patch(&mut self, id: &str, patch: &ProjectPatch) -> bool {
        match self.projects.iter_mut().find(|p| p.id == id) {
            Some(p) => patch.apply(p),
            None => false,
        }
    }

    /// Drop a project and, with it, every task loaded for it.
    pub fn remove(&mut self, id: &str, tasks: &mut TaskCollection) -> Option<Project> {
        tasks.clear_project(id);
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        let idx = self.projects.iter().position(|p| p.id == id)?;
        Some(self.projects.remove(idx))
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn select(&mut self, id: Option<&str>) {
        self.selected = id.filter(|id| self.get(id).is_some()).map(str::to_string);
    }

    pub fn selected(&self) -> Option<&Project> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    pub fn clear(&mut self) {
        self.projects.clear();
        self.selected = None;
    }

    /// Resolve a project by exact id, id prefix, or case-insensitive title.
    /// Ambiguous names are an error listing the candidates.
    pub fn resolve(&self, identifier: &str) -> Result<&Project, SyncError> {
        if let Some(p) = self.get(identifier) {
            return Ok(p);
        }
        let needle = identifier.trim().to_lowercase();
        let matches: Vec<&Project> = self
            .projects
            .iter()
            .filter(|p| p.title.to_lowercase() == needle || (needle.len() >= 4 && p.id.starts_with(identifier)))
            .collect();
        match matches.as_slice() {
            [] => Err(SyncError::NotFound(format!("no project named '{identifier}'"))),
            [one] => Ok(one),
            many => {
                let mut msg = format!("multiple projects match '{identifier}':");
                for p in many {
                    msg.push_str(&format!("\n  {} {}", p.id, p.title));
                }
                msg.push_str("\nuse the id instead");
                Err(SyncError::Validation(msg))
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_project(id: &str, title: &str, created_secs: i64) -> Project {
    Project {
        id: id.to_string(),
        owner_id: "demo_user".into(),
        title: title.to_string(),
        category: DEFAULT_CATEGORY.into(),
        scale: DEFAULT_SCALE,
        color: None,
        summary: String::new(),
        created_at: DateTime::<Utc>::from_timestamp(created_secs, 0).unwrap_or_default(),
    }
}
