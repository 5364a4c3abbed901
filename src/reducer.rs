//! Drag-and-drop reducer.
//!
//! Pure functions computing the next task sequence of a project from a drag
//! gesture. The board sequence is the tasks sorted by `(column, order)`; ties
//! keep their stored position. After every move each column is re-ranked
//! `0..n-1` in sequence order.

use crate::collection::assign_dense_orders;
use crate::fields::Status;
use crate::task::{Task, TaskId, TaskUpdate};

/// Where a dragged card was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// Empty space of a column: change status, append at the end.
    Column(Status),
    /// Another card: take its position, and its column.
    Task(TaskId),
}

impl DropTarget {
    /// Column ids ("TODO", "DONE", ...) name columns, anything else is a task id.
    pub fn parse(id: &str) -> Self {
        match Status::from_column_id(id) {
            Some(status) => DropTarget::Column(status),
            None => DropTarget::Task(id.to_string()),
        }
    }
}

/// Tasks in board order. Stable, so equal ranks keep their stored position.
pub fn board_sequence(tasks: &[Task]) -> Vec<Task> {
    let mut seq = tasks.to_vec();
    seq.sort_by_key(|t| (t.status.index(), t.order));
    seq
}

/// Apply a drop. Returns `None` when the gesture is a no-op: unknown dragged
/// task, unknown target task, dropping a card onto itself, or dropping it on
/// the column it already sits in.
pub fn apply_drop(tasks: &[Task], active_id: &str, target: &DropTarget) -> Option<Vec<Task>> {
    let mut seq = board_sequence(tasks);
    let from = seq.iter().position(|t| t.id == active_id)?;

    match target {
        DropTarget::Column(status) => {
            if seq[from].status == *status {
                return None;
            }
            let mut moved = seq.remove(from);
            moved.status = *status;
            seq.push(moved);
        }
        DropTarget::Task(over_id) => {
            if over_id == active_id {
                return None;
            }
            let to = seq.iter().position(|t| t.id == *over_id)?;
            let status = seq[to].status;
            let mut moved = seq.remove(from);
            moved.status = status;
            seq.insert(to, moved);
        }
    }

    assign_dense_orders(&mut seq);
    Some(seq)
}

/// Reducer entry point: the next sequence, or the input unchanged for a no-op.
pub fn reduce(tasks: &[Task], active_id: &str, target: &DropTarget) -> Vec<Task> {
    apply_drop(tasks, active_id, target).unwrap_or_else(|| tasks.to_vec())
}

/// Status/order changes between two versions of the same task set, in the
/// order of `after`.
pub fn position_updates(before: &[Task], after: &[Task]) -> Vec<TaskUpdate> {
    after
        .iter()
        .filter_map(|t| {
            let old = before.iter().find(|b| b.id == t.id);
            let status_changed = old.map_or(true, |o| o.status != t.status);
            let order_changed = old.map_or(true, |o| o.order != t.order);
            if !status_changed && !order_changed {
                return None;
            }
            Some(TaskUpdate {
                id: t.id.clone(),
                status: status_changed.then_some(t.status),
                order: order_changed.then_some(t.order),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::sample;

    fn column(tasks: &[Task], status: Status) -> Vec<(String, u32)> {
        board_sequence(tasks)
            .into_iter()
            .filter(|t| t.status == status)
            .map(|t| (t.id, t.order))
            .collect()
    }

    fn board() -> Vec<Task> {
        vec![
            sample("a", "p1", Status::Todo, 0),
            sample("b", "p1", Status::Todo, 1),
            sample("c", "p1", Status::Todo, 2),
            sample("x", "p1", Status::InProgress, 0),
            sample("y", "p1", Status::InProgress, 1),
        ]
    }

    #[test]
    fn test_drop_on_column_appends_and_renormalizes() {
        let next = reduce(&board(), "a", &DropTarget::Column(Status::InProgress));
        assert_eq!(
            column(&next, Status::InProgress),
            vec![("x".into(), 0), ("y".into(), 1), ("a".into(), 2)]
        );
        assert_eq!(column(&next, Status::Todo), vec![("b".into(), 0), ("c".into(), 1)]);
    }

    #[test]
    fn test_drop_on_own_column_is_noop() {
        let tasks = board();
        assert!(apply_drop(&tasks, "b", &DropTarget::Column(Status::Todo)).is_none());
        assert_eq!(reduce(&tasks, "b", &DropTarget::Column(Status::Todo)), tasks);
    }

    #[test]
    fn test_noop_guards() {
        let tasks = board();
        assert_eq!(reduce(&tasks, "a", &DropTarget::Task("a".into())), tasks);
        assert_eq!(reduce(&tasks, "ghost", &DropTarget::Column(Status::Done)), tasks);
        assert_eq!(reduce(&tasks, "a", &DropTarget::Task("ghost".into())), tasks);
    }

    #[test]
    fn test_reorder_within_column() {
        let next = reduce(&board(), "c", &DropTarget::Task("a".into()));
        assert_eq!(
            column(&next, Status::Todo),
            vec![("c".into(), 0), ("a".into(), 1), ("b".into(), 2)]
        );
        let next = reduce(&board(), "a", &DropTarget::Task("c".into()));
        assert_eq!(
            column(&next, Status::Todo),
            vec![("b".into(), 0), ("c".into(), 1), ("a".into(), 2)]
        );
    }

    #[test]
    fn test_drop_on_task_in_other_column_takes_its_status() {
        let next = reduce(&board(), "y", &DropTarget::Task("b".into()));
        let y = next.iter().find(|t| t.id == "y").unwrap();
        assert_eq!(y.status, Status::Todo);
        assert_eq!(
            column(&next, Status::Todo),
            vec![("a".into(), 0), ("y".into(), 1), ("b".into(), 2), ("c".into(), 3)]
        );
        assert_eq!(column(&next, Status::InProgress), vec![("x".into(), 0)]);
    }

    #[test]
    fn test_stale_gaps_are_closed() {
        let tasks = vec![
            sample("a", "p1", Status::Done, 4),
            sample("b", "p1", Status::Done, 9),
            sample("c", "p1", Status::Todo, 7),
        ];
        let next = reduce(&tasks, "c", &DropTarget::Column(Status::Done));
        assert_eq!(
            column(&next, Status::Done),
            vec![("a".into(), 0), ("b".into(), 1), ("c".into(), 2)]
        );
    }

    #[test]
    fn test_columns_stay_dense_under_any_gesture_sequence() {
        let mut tasks = board();
        tasks.push(sample("g", "p1", Status::Goal, 0));
        tasks.push(sample("d", "p1", Status::Done, 0));
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut targets: Vec<DropTarget> = Status::ALL.iter().map(|s| DropTarget::Column(*s)).collect();
        targets.extend(ids.iter().map(|id| DropTarget::Task(id.clone())));

        let mut step = 0usize;
        for active in ids.iter().cycle().take(60) {
            let target = &targets[(step * 7 + 3) % targets.len()];
            step += 1;
            tasks = reduce(&tasks, active, target);
            for status in Status::ALL {
                let mut orders: Vec<u32> = tasks.iter().filter(|t| t.status == status).map(|t| t.order).collect();
                orders.sort_unstable();
                let expected: Vec<u32> = (0..orders.len() as u32).collect();
                assert_eq!(orders, expected, "column {status} after step {step}");
            }
            assert_eq!(tasks.len(), ids.len());
        }
    }

    #[test]
    fn test_position_updates_report_only_changes() {
        let before = board();
        let after = reduce(&before, "a", &DropTarget::Column(Status::InProgress));
        let updates = position_updates(&before, &after);
        let a = updates.iter().find(|u| u.id == "a").unwrap();
        assert_eq!(a.status, Some(Status::InProgress));
        assert_eq!(a.order, Some(2));
        let b = updates.iter().find(|u| u.id == "b").unwrap();
        assert_eq!(b.status, None);
        assert_eq!(b.order, Some(0));
        assert!(updates.iter().all(|u| u.id != "x" && u.id != "y"));
    }

    #[test]
    fn test_parse_drop_target() {
        assert_eq!(DropTarget::parse("DONE"), DropTarget::Column(Status::Done));
        assert_eq!(DropTarget::parse("t-17"), DropTarget::Task("t-17".into()));
    }
}
