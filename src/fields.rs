//! Enumerations and field types for the board.
//!
//! This module defines the fixed kanban columns, task priorities and the
//! category colour palette used to derive a project's colour.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Kanban column a task sits in.
///
/// The declaration order is the column order: `Goal` conceptually precedes
/// `Todo`, and `Done` is always last.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq, PartialOrd, Ord,
    Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Goal,
    #[default]
    Todo,
    InProgress,
    Done,
}

impl Status {
    /// All columns in board order.
    pub const ALL: [Status; 4] = [Status::Goal, Status::Todo, Status::InProgress, Status::Done];

    /// Position of the column on the board.
    pub fn index(self) -> usize {
        match self {
            Status::Goal => 0,
            Status::Todo => 1,
            Status::InProgress => 2,
            Status::Done => 3,
        }
    }

    /// Wire / column identifier ("GOAL", "TODO", "IN_PROGRESS", "DONE").
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Goal => "GOAL",
            Status::Todo => "TODO",
            Status::InProgress => "IN_PROGRESS",
            Status::Done => "DONE",
        }
    }

    /// Column heading for display.
    pub fn title(self) -> &'static str {
        match self {
            Status::Goal => "Goal",
            Status::Todo => "To Do",
            Status::InProgress => "In Progress",
            Status::Done => "Done",
        }
    }

    /// Resolve a drop target identifier to a column, if it names one.
    pub fn from_column_id(id: &str) -> Option<Status> {
        Status::ALL.into_iter().find(|s| s.as_str() == id)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    /// Accepts wire identifiers as well as the kebab-case CLI spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "GOAL" => Ok(Status::Goal),
            "TODO" => Ok(Status::Todo),
            "IN_PROGRESS" => Ok(Status::InProgress),
            "DONE" => Ok(Status::Done),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Task priority.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Format a priority for display.
pub fn format_priority(p: Option<Priority>) -> &'static str {
    match p {
        Some(Priority::Low) => "Low",
        Some(Priority::Medium) => "Medium",
        Some(Priority::High) => "High",
        Some(Priority::Urgent) => "Urgent",
        None => "-",
    }
}

/// Category assigned to a project when none is given.
pub const DEFAULT_CATEGORY: &str = "General";

/// Palette used when a project carries no explicit colour.
const CATEGORY_COLORS: [(&str, &str); 6] = [
    ("Software", "#7C3AED"),
    ("Business", "#06B6D4"),
    ("Design", "#EC4899"),
    ("Marketing", "#F59E0B"),
    ("Finance", "#10B981"),
    (DEFAULT_CATEGORY, "#6366F1"),
];

/// Deterministic colour for a category. Unknown categories share the
/// `General` colour.
pub fn category_color(category: &str) -> &'static str {
    CATEGORY_COLORS
        .iter()
        .find(|(name, _)| *name == category)
        .or_else(|| CATEGORY_COLORS.iter().find(|(name, _)| *name == DEFAULT_CATEGORY))
        .map(|(_, color)| *color)
        .unwrap_or("#6366F1")
}
