//! Read-side projections of a project's tasks.
//!
//! Everything here is pure and cheap enough to recompute on every render:
//! the four-column board with its progress statistics, task filters, and the
//! dependency view of a single task.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collection::Columns;
use crate::fields::{Priority, Status};
use crate::task::{Task, TaskId};

/// Rounded share of `part` in `total`; 0 for an empty board.
fn percent(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusShare {
    pub status: Status,
    pub count: usize,
    pub percentage: u8,
}

/// Aggregate progress of one board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub completed: usize,
    /// `DONE / total`, rounded to the nearest integer.
    pub progress: u8,
    /// One entry per column, in board order.
    pub breakdown: Vec<StatusShare>,
    pub estimated_hours: f64,
    pub actual_hours: f64,
}

impl BoardStats {
    pub fn compute(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let mut counts = [0usize; 4];
        let mut estimated_hours = 0.0;
        let mut actual_hours = 0.0;
        for t in tasks {
            counts[t.status.index()] += 1;
            estimated_hours += t.estimated_hours.unwrap_or(0.0);
            actual_hours += t.actual_hours.unwrap_or(0.0);
        }
        let completed = counts[Status::Done.index()];
        BoardStats {
            total,
            completed,
            progress: percent(completed, total),
            breakdown: Status::ALL
                .iter()
                .map(|s| StatusShare { status: *s, count: counts[s.index()], percentage: percent(counts[s.index()], total) })
                .collect(),
            estimated_hours,
            actual_hours,
        }
    }

    pub fn count(&self, status: Status) -> usize {
        self.breakdown.get(status.index()).map_or(0, |s| s.count)
    }
}

/// The board view: columns plus statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub columns: Columns,
    pub stats: BoardStats,
}

impl Board {
    pub fn project(tasks: &[Task]) -> Self {
        Board { columns: Columns::group(tasks), stats: BoardStats::compute(tasks) }
    }
}

/// Narrow the visible cards. Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Case-insensitive substring of content, description or any tag.
    pub search: Option<String>,
    pub statuses: Vec<Status>,
    /// Tasks without a priority are never excluded by this criterion.
    pub priorities: Vec<Priority>,
    pub assignees: Vec<String>,
    /// Match if the task carries any of these tags.
    pub tags: Vec<String>,
    pub has_dependencies: Option<bool>,
    /// Only tasks whose due date is not in the future.
    pub overdue: bool,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Number of criteria in effect.
    pub fn active_count(&self) -> usize {
        [
            self.search.as_deref().is_some_and(|s| !s.trim().is_empty()),
            !self.statuses.is_empty(),
            !self.priorities.is_empty(),
            !self.assignees.is_empty(),
            !self.tags.is_empty(),
            self.has_dependencies.is_some(),
            self.overdue,
        ]
        .iter()
        .filter(|on| **on)
        .count()
    }

    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = task.content.to_lowercase().contains(&needle)
                || task.description.to_lowercase().contains(&needle)
                || task.tags.iter().any(|t| t.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if let Some(p) = task.priority {
            if !self.priorities.is_empty() && !self.priorities.contains(&p) {
                return false;
            }
        }
        if !self.assignees.is_empty() {
            match &task.assignee {
                Some(a) if self.assignees.contains(a) => {}
                _ => return false,
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| task.tags.contains(t)) {
            return false;
        }
        if let Some(want) = self.has_dependencies {
            if want != !task.dependencies.is_empty() {
                return false;
            }
        }
        if self.overdue && !task.due_date.is_some_and(|d| d <= now) {
            return false;
        }
        true
    }

    pub fn apply(&self, tasks: &[Task], now: DateTime<Utc>) -> Vec<Task> {
        tasks.iter().filter(|t| self.matches(t, now)).cloned().collect()
    }
}

/// One resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyLink {
    pub id: TaskId,
    pub content: String,
    pub status: Status,
    /// The dependency lists this task back.
    pub circular: bool,
}

impl DependencyLink {
    /// Circular edges never block.
    pub fn is_blocking(&self) -> bool {
        self.status != Status::Done && !self.circular
    }
}

/// Dependency view of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyReport {
    pub task_id: TaskId,
    pub links: Vec<DependencyLink>,
    /// Dependency ids that no longer resolve; ignored for startability.
    pub dangling: Vec<TaskId>,
    /// Tasks that list this one as a dependency.
    pub dependents: Vec<TaskId>,
    pub can_start: bool,
}

impl DependencyReport {
    pub fn build(task: &Task, all: &[Task]) -> Self {
        let mut links = Vec::new();
        let mut dangling = Vec::new();
        for dep_id in &task.dependencies {
            match all.iter().find(|t| t.id == *dep_id) {
                Some(dep) => links.push(DependencyLink {
                    id: dep.id.clone(),
                    content: dep.content.clone(),
                    status: dep.status,
                    circular: dep.dependencies.contains(&task.id),
                }),
                None => dangling.push(dep_id.clone()),
            }
        }
        let can_start = links.iter().all(|l| !l.is_blocking());
        DependencyReport {
            task_id: task.id.clone(),
            links,
            dangling,
            dependents: dependents(&task.id, all).into_iter().map(|t| t.id.clone()).collect(),
            can_start,
        }
    }

    pub fn has_circular(&self) -> bool {
        self.links.iter().any(|l| l.circular)
    }

    /// Ids of the dependencies currently holding the task back.
    pub fn blocking(&self) -> Vec<&str> {
        self.links.iter().filter(|l| l.is_blocking()).map(|l| l.id.as_str()).collect()
    }
}

/// Whether every prerequisite is done (or circular, or gone).
pub fn can_start(task: &Task, all: &[Task]) -> bool {
    DependencyReport::build(task, all).can_start
}

/// Resolvable, unfinished, non-circular dependencies of `task`.
pub fn blocking_tasks<'a>(task: &Task, all: &'a [Task]) -> Vec<&'a Task> {
    task.dependencies
        .iter()
        .filter_map(|id| all.iter().find(|t| t.id == *id))
        .filter(|dep| dep.status != Status::Done && !dep.dependencies.contains(&task.id))
        .collect()
}

/// Candidates for a new dependency: neither the task itself nor already listed.
pub fn available_dependencies<'a>(task: &Task, all: &'a [Task]) -> Vec<&'a Task> {
    all.iter()
        .filter(|t| t.id != task.id && !task.dependencies.contains(&t.id))
        .collect()
}

/// Tasks that depend on `task_id`.
pub fn dependents<'a>(task_id: &str, all: &'a [Task]) -> Vec<&'a Task> {
    all.iter().filter(|t| t.dependencies.iter().any(|d| d == task_id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::sample;
    use chrono::Duration;

    fn with_deps(mut task: Task, deps: &[&str]) -> Task {
        task.dependencies = deps.iter().map(|d| d.to_string()).collect();
        task
    }

    #[test]
    fn test_stats_on_empty_board() {
        let stats = BoardStats::compute(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.progress, 0);
        assert_eq!(stats.breakdown.len(), 4);
        assert!(stats.breakdown.iter().all(|s| s.percentage == 0));
    }

    #[test]
    fn test_stats_round_to_nearest() {
        let mut tasks = vec![
            sample("a", "p", Status::Done, 0),
            sample("b", "p", Status::Done, 1),
            sample("c", "p", Status::Todo, 0),
        ];
        tasks[0].estimated_hours = Some(2.5);
        tasks[2].actual_hours = Some(1.0);
        let stats = BoardStats::compute(&tasks);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.progress, 67);
        assert_eq!(stats.count(Status::Todo), 1);
        assert_eq!(stats.breakdown[Status::Todo.index()].percentage, 33);
        assert_eq!(stats.estimated_hours, 2.5);
        assert_eq!(stats.actual_hours, 1.0);
    }

    #[test]
    fn test_startability() {
        let done = sample("d", "p", Status::Done, 0);
        let open = sample("o", "p", Status::Todo, 0);
        let free = sample("f", "p", Status::Todo, 1);
        let all = vec![done.clone(), open.clone(), free.clone()];

        assert!(can_start(&free, &all));
        assert!(can_start(&with_deps(free.clone(), &["d"]), &all));
        assert!(!can_start(&with_deps(free.clone(), &["d", "o"]), &all));
    }

    #[test]
    fn test_circular_edges_do_not_block_but_are_flagged() {
        let a = with_deps(sample("a", "p", Status::Todo, 0), &["b"]);
        let b = with_deps(sample("b", "p", Status::Todo, 1), &["a"]);
        let all = vec![a.clone(), b];
        let report = DependencyReport::build(&a, &all);
        assert!(report.can_start);
        assert!(report.has_circular());
        assert!(report.blocking().is_empty());
        assert!(blocking_tasks(&a, &all).is_empty());
    }

    #[test]
    fn test_dangling_dependency_is_ignored() {
        let a = with_deps(sample("a", "p", Status::Todo, 0), &["deleted", "o"]);
        let o = sample("o", "p", Status::InProgress, 0);
        let all = vec![a.clone(), o];
        let report = DependencyReport::build(&a, &all);
        assert_eq!(report.dangling, vec!["deleted".to_string()]);
        assert_eq!(report.blocking(), vec!["o"]);
        let blocking: Vec<&str> = blocking_tasks(&a, &all).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(blocking, vec!["o"]);

        let only_gone = with_deps(sample("g", "p", Status::Todo, 1), &["deleted"]);
        assert!(can_start(&only_gone, &all));
    }

    #[test]
    fn test_available_dependencies_and_dependents() {
        let a = with_deps(sample("a", "p", Status::Todo, 0), &["b"]);
        let b = sample("b", "p", Status::Todo, 1);
        let c = with_deps(sample("c", "p", Status::Todo, 2), &["a"]);
        let all = vec![a.clone(), b, c];
        let ids: Vec<&str> = available_dependencies(&a, &all).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
        assert_eq!(DependencyReport::build(&a, &all).dependents, vec!["c".to_string()]);
    }

    #[test]
    fn test_filters() {
        let now = Utc::now();
        let mut a = sample("a", "p", Status::Todo, 0);
        a.content = "Write Launch post".into();
        a.tags = vec!["marketing".into()];
        a.priority = Some(Priority::High);
        a.due_date = Some(now - Duration::days(1));
        let mut b = sample("b", "p", Status::Done, 0);
        b.assignee = Some("kim".into());
        b.due_date = Some(now + Duration::days(3));
        let c = sample("c", "p", Status::Todo, 1);
        let tasks = vec![a, b, c];
        let ids = |f: &TaskFilter| -> Vec<String> { f.apply(&tasks, now).into_iter().map(|t| t.id).collect() };

        assert_eq!(ids(&TaskFilter::default()).len(), 3);
        assert_eq!(ids(&TaskFilter { search: Some("launch".into()), ..Default::default() }), vec!["a"]);
        assert_eq!(ids(&TaskFilter { search: Some("MARK".into()), ..Default::default() }), vec!["a"]);
        assert_eq!(
            ids(&TaskFilter { priorities: vec![Priority::Low], ..Default::default() }),
            vec!["b", "c"]
        );
        assert_eq!(ids(&TaskFilter { assignees: vec!["kim".into()], ..Default::default() }), vec!["b"]);
        assert_eq!(ids(&TaskFilter { overdue: true, ..Default::default() }), vec!["a"]);
        assert_eq!(
            ids(&TaskFilter { statuses: vec![Status::Todo], tags: vec!["marketing".into()], ..Default::default() }),
            vec!["a"]
        );
        assert_eq!(TaskFilter { overdue: true, search: Some(" ".into()), ..Default::default() }.active_count(), 1);
    }

    #[test]
    fn test_board_projection_has_four_columns() {
        let board = Board::project(&[sample("a", "p", Status::Goal, 0)]);
        assert_eq!(board.columns.iter().count(), 4);
        assert_eq!(board.stats.count(Status::Goal), 1);
    }
}
