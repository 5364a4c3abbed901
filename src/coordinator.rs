//! Optimistic mutation coordinator.
//!
//! Every task mutation a user triggers goes through the same protocol:
//!
//! 1. apply the change to the shared `TaskCollection` synchronously, so it is
//!    visible before any I/O starts;
//! 2. spawn the gateway call without waiting for it;
//! 3. on success, reconcile (a created task swaps its temporary id for the
//!    server's id right away);
//! 4. on failure, publish a `Notice` and either keep the local change
//!    (`FailurePolicy::Retain`) or undo it with the exact inverse of step 1
//!    (`FailurePolicy::Rollback`).
//!
//! Step 1 always runs against the latest in-memory snapshot under one lock, so
//! local state reflects mutations in the order they were issued regardless of
//! the order in which the network answers.
//!
//! A mutation that touches a task whose create has not been confirmed yet
//! holds its store call back until the create answers, then sends the
//! server id instead of the temporary one. If the create failed, the task
//! never reached the store and is left out of the call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::collection::{assign_dense_orders, TaskCollection};
use crate::config::FailurePolicy;
use crate::error::SyncError;
use crate::gateway::SyncGateway;
use crate::reducer::{apply_drop, board_sequence, position_updates, DropTarget};
use crate::task::{is_temp_id, new_temp_id, Task, TaskDraft, TaskId, TaskPatch, TaskUpdate};

pub type SharedTasks = Arc<Mutex<TaskCollection>>;
pub type MutationId = u64;

/// Settled mutations kept for `history`; older ones are pruned first.
pub const HISTORY_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationState {
    /// Applied locally, waiting on the store.
    Pending,
    Confirmed,
    /// The store refused; the local change was kept and the user told.
    FailedNotified,
    /// The store refused; the local change was undone and the user told.
    RolledBack,
}

impl MutationState {
    pub fn is_settled(self) -> bool {
        self != MutationState::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Move,
    Edit,
    Delete,
}

/// User-facing report of a failed sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub mutation: MutationId,
    pub kind: MutationKind,
    pub project_id: String,
    pub task_id: TaskId,
    /// What to show the user.
    pub message: String,
    /// The underlying error, for logs.
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRecord {
    pub id: MutationId,
    pub kind: MutationKind,
    pub project_id: String,
    pub task_id: TaskId,
    pub state: MutationState,
}

/// Handle on a dispatched mutation.
#[derive(Debug)]
pub struct PendingMutation {
    pub id: MutationId,
    pub kind: MutationKind,
    /// The affected task; for a create, its temporary id.
    pub task_id: TaskId,
    done: oneshot::Receiver<MutationState>,
}

impl PendingMutation {
    /// Wait for the store to answer. A mutation whose worker was aborted
    /// (session teardown) reports `FailedNotified`.
    pub async fn settled(self) -> MutationState {
        self.done.await.unwrap_or(MutationState::FailedNotified)
    }
}

/// The inverse of a local apply.
#[derive(Debug, Clone)]
enum Undo {
    /// Drop an optimistically created task.
    Discard { task_id: TaskId },
    /// Restore edited fields.
    Patch { task_id: TaskId, patch: TaskPatch },
    /// Restore previous status/order values.
    Positions(Vec<TaskUpdate>),
    /// Put a deleted task back where it was and restore its column.
    Reinsert { index: usize, task: Box<Task>, positions: Vec<TaskUpdate> },
}

impl Undo {
    fn revert(self, tasks: &mut TaskCollection, project_id: &str) {
        match self {
            Undo::Discard { task_id } => {
                tasks.remove(project_id, &task_id);
            }
            Undo::Patch { task_id, patch } => {
                tasks.patch(project_id, &task_id, &patch);
            }
            Undo::Positions(updates) => apply_positions(tasks, project_id, &updates),
            Undo::Reinsert { index, task, positions } => {
                apply_positions(tasks, project_id, &positions);
                tasks.insert_at(project_id, index, *task);
            }
        }
        tasks.renormalize(project_id);
    }
}

fn apply_positions(tasks: &mut TaskCollection, project_id: &str, updates: &[TaskUpdate]) {
    for u in updates {
        tasks.patch(project_id, &u.id, &u.to_patch());
    }
}

/// For each update, the values it overwrote.
fn inverse_updates(before: &[Task], updates: &[TaskUpdate]) -> Vec<TaskUpdate> {
    updates
        .iter()
        .filter_map(|u| {
            let old = before.iter().find(|t| t.id == u.id)?;
            Some(TaskUpdate {
                id: u.id.clone(),
                status: u.status.map(|_| old.status),
                order: u.order.map(|_| old.order),
            })
        })
        .collect()
}

/// Re-densify a project's columns in place (vector order untouched) and
/// return the updates made plus their inverse.
fn densify(tasks: &mut TaskCollection, project_id: &str) -> (Vec<TaskUpdate>, Vec<TaskUpdate>) {
    let before = tasks.tasks(project_id).to_vec();
    let mut seq = board_sequence(&before);
    assign_dense_orders(&mut seq);
    let updates = position_updates(&before, &seq);
    apply_positions(tasks, project_id, &updates);
    let inverse = inverse_updates(&before, &updates);
    (updates, inverse)
}

type MutationLog = BTreeMap<MutationId, MutationRecord>;

fn prune(log: &mut MutationLog) {
    let excess = log.len().saturating_sub(HISTORY_LIMIT);
    if excess == 0 {
        return;
    }
    let stale: Vec<MutationId> =
        log.values().filter(|r| r.state.is_settled()).map(|r| r.id).take(excess).collect();
    for id in stale {
        log.remove(&id);
    }
}

/// Waiters on temporary ids whose create is still in flight.
#[derive(Debug, Default)]
struct PendingCreates {
    waiters: HashMap<TaskId, Vec<oneshot::Sender<Option<TaskId>>>>,
}

impl PendingCreates {
    fn track(&mut self, temp_id: &str) {
        self.waiters.entry(temp_id.to_string()).or_default();
    }

    fn wait(&mut self, temp_id: &str) -> Option<oneshot::Receiver<Option<TaskId>>> {
        let waiters = self.waiters.get_mut(temp_id)?;
        let (tx, rx) = oneshot::channel();
        waiters.push(tx);
        Some(rx)
    }

    /// Hand the outcome of a create to everyone waiting on it.
    fn resolve(&mut self, temp_id: &str, server_id: Option<&str>) {
        for tx in self.waiters.remove(temp_id).into_iter().flatten() {
            let _ = tx.send(server_id.map(str::to_string));
        }
    }
}

/// Temporary ids a store call has to wait for.
#[derive(Debug, Default)]
struct ServerIds {
    waiting: Vec<(TaskId, oneshot::Receiver<Option<TaskId>>)>,
    unsaved: Vec<TaskId>,
}

impl ServerIds {
    async fn resolve(self) -> IdMap {
        let mut ids: HashMap<TaskId, Option<TaskId>> = self.unsaved.into_iter().map(|id| (id, None)).collect();
        for (temp, rx) in self.waiting {
            // A dropped sender means the create was aborted.
            let server = rx.await.ok().flatten();
            ids.insert(temp, server);
        }
        IdMap(ids)
    }
}

/// Temporary id to server id, `None` for tasks that never reached the store.
#[derive(Debug, Default)]
struct IdMap(HashMap<TaskId, Option<TaskId>>);

impl IdMap {
    fn server_id(&self, id: &str) -> Option<TaskId> {
        match self.0.get(id) {
            Some(mapped) => mapped.clone(),
            None => Some(id.to_string()),
        }
    }

    fn updates(&self, updates: Vec<TaskUpdate>) -> Vec<TaskUpdate> {
        updates
            .into_iter()
            .filter_map(|mut u| {
                u.id = self.server_id(&u.id)?;
                Some(u)
            })
            .collect()
    }

    /// Unsaved prerequisites keep their temporary id and dangle.
    fn dependencies(&self, deps: Vec<TaskId>) -> Vec<TaskId> {
        deps.into_iter().map(|d| self.server_id(&d).unwrap_or(d)).collect()
    }
}

fn unsaved_task(id: &str) -> SyncError {
    SyncError::NotFound(format!("task {id} was never saved"))
}

pub struct Coordinator {
    tasks: SharedTasks,
    gateway: Arc<SyncGateway>,
    policy: FailurePolicy,
    notices: mpsc::UnboundedSender<Notice>,
    log: Arc<Mutex<MutationLog>>,
    creates: Arc<Mutex<PendingCreates>>,
    inflight: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Coordinator {
    /// Build a coordinator and the channel its failure notices arrive on.
    pub fn new(
        tasks: SharedTasks,
        gateway: Arc<SyncGateway>,
        policy: FailurePolicy,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            tasks,
            gateway,
            policy,
            notices: tx,
            log: Arc::new(Mutex::new(BTreeMap::new())),
            creates: Arc::new(Mutex::new(PendingCreates::default())),
            inflight: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        };
        (coordinator, rx)
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn tasks(&self) -> &SharedTasks {
        &self.tasks
    }

    /// State of one mutation, if it was ever dispatched.
    pub fn state(&self, id: MutationId) -> Option<MutationState> {
        self.log.lock().get(&id).map(|r| r.state)
    }

    /// Dispatched mutations, oldest first. Pending ones are always listed;
    /// settled ones only up to `HISTORY_LIMIT`.
    pub fn history(&self) -> Vec<MutationRecord> {
        self.log.lock().values().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.log.lock().values().filter(|r| !r.state.is_settled()).count()
    }

    /// Register interest in the server ids of any temporary ids among `ids`.
    /// Call with the task lock held so a create cannot reconcile in between.
    fn server_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> ServerIds {
        let mut creates = self.creates.lock();
        let mut out = ServerIds::default();
        let mut seen = HashSet::new();
        for id in ids.into_iter().filter(|id| is_temp_id(id)) {
            if !seen.insert(id) {
                continue;
            }
            match creates.wait(id) {
                Some(rx) => out.waiting.push((id.to_string(), rx)),
                None => out.unsaved.push(id.to_string()),
            }
        }
        out
    }

    fn dispatch<T, F, S>(
        &self,
        kind: MutationKind,
        project_id: &str,
        task_id: &str,
        undo: Undo,
        remote: F,
        on_success: S,
    ) -> PendingMutation
    where
        T: Send + 'static,
        F: Future<Output = Result<T, SyncError>> + Send + 'static,
        S: FnOnce(&mut TaskCollection, T) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.log.lock().insert(
            id,
            MutationRecord {
                id,
                kind,
                project_id: project_id.to_string(),
                task_id: task_id.to_string(),
                state: MutationState::Pending,
            },
        );
        tracing::debug!("Dispatching {:?} mutation {} on task {}", kind, id, task_id);

        let (done_tx, done_rx) = oneshot::channel();
        let tasks = self.tasks.clone();
        let log = self.log.clone();
        let notices = self.notices.clone();
        let policy = self.policy;
        let project = project_id.to_string();
        let task = task_id.to_string();

        let handle = tokio::spawn(async move {
            let state = match remote.await {
                Ok(value) => {
                    let mut guard = tasks.lock();
                    on_success(&mut *guard, value);
                    MutationState::Confirmed
                }
                Err(err) => {
                    tracing::warn!("Sync of {:?} mutation {} failed: {}", kind, id, err);
                    let state = match policy {
                        FailurePolicy::Retain => MutationState::FailedNotified,
                        FailurePolicy::Rollback => {
                            let mut guard = tasks.lock();
                            undo.revert(&mut *guard, &project);
                            MutationState::RolledBack
                        }
                    };
                    let _ = notices.send(Notice {
                        mutation: id,
                        kind,
                        project_id: project.clone(),
                        task_id: task.clone(),
                        message: err.user_message(),
                        detail: err.to_string(),
                    });
                    state
                }
            };
            {
                let mut log = log.lock();
                if let Some(record) = log.get_mut(&id) {
                    record.state = state;
                }
                prune(&mut log);
            }
            tracing::debug!("Mutation {} settled as {:?}", id, state);
            let _ = done_tx.send(state);
        });
        let mut inflight = self.inflight.lock();
        inflight.retain(|h| !h.is_finished());
        inflight.push(handle);
        drop(inflight);

        PendingMutation { id, kind, task_id: task_id.to_string(), done: done_rx }
    }

    /// Create a task. The card appears at the end of its column under a
    /// temporary id at once; the server id replaces it when the store answers.
    /// Invalid drafts are rejected before anything is applied.
    pub fn create_task(&self, mut draft: TaskDraft) -> Result<PendingMutation, SyncError> {
        let project_id = draft.validate()?.to_string();
        let temp_id = new_temp_id();
        let prerequisites = {
            let mut tasks = self.tasks.lock();
            draft.order = Some(tasks.next_order(&project_id, draft.status));
            let task = Task::from_draft(temp_id.clone(), &project_id, draft.clone(), Utc::now());
            tasks.add(&project_id, task)?;
            self.creates.lock().track(&temp_id);
            self.server_ids(draft.dependencies.iter().map(String::as_str))
        };

        let gateway = self.gateway.clone();
        let creates = self.creates.clone();
        let pending = self.creates.clone();
        let project = project_id.clone();
        let temp = temp_id.clone();
        let failed_temp = temp_id.clone();
        Ok(self.dispatch(
            MutationKind::Create,
            &project_id,
            &temp_id,
            Undo::Discard { task_id: temp_id.clone() },
            async move {
                let ids = prerequisites.resolve().await;
                draft.dependencies = ids.dependencies(std::mem::take(&mut draft.dependencies));
                let created = gateway.create_task(&draft).await;
                if created.is_err() {
                    creates.lock().resolve(&failed_temp, None);
                }
                created
            },
            move |tasks, created: Task| {
                pending.lock().resolve(&temp, Some(&created.id));
                if tasks.rename(&project, &temp, &created.id) {
                    if let Some(t) = tasks.get_mut(&project, &created.id) {
                        t.created_at = created.created_at;
                    }
                    tracing::debug!("Reconciled {} as {}", temp, created.id);
                } else {
                    tracing::debug!("Temporary task {} was removed before {} was confirmed", temp, created.id);
                }
            },
        ))
    }

    /// Apply a drag gesture. Returns `None` when the gesture changes nothing,
    /// in which case nothing is sent.
    pub fn move_task(&self, project_id: &str, active_id: &str, target: &DropTarget) -> Option<PendingMutation> {
        let (updates, inverse, ids) = {
            let mut tasks = self.tasks.lock();
            let before = tasks.tasks(project_id).to_vec();
            let after = apply_drop(&before, active_id, target)?;
            let updates = position_updates(&before, &after);
            if updates.is_empty() {
                return None;
            }
            apply_positions(&mut tasks, project_id, &updates);
            let ids = self.server_ids(updates.iter().map(|u| u.id.as_str()));
            let inverse = inverse_updates(&before, &updates);
            (updates, inverse, ids)
        };

        let gateway = self.gateway.clone();
        Some(self.dispatch(
            MutationKind::Move,
            project_id,
            active_id,
            Undo::Positions(inverse),
            async move {
                let ids = ids.resolve().await;
                gateway.bulk_patch_tasks(&ids.updates(updates)).await
            },
            |_, ()| {},
        ))
    }

    /// Inline edit. Status and order belong to `move_task`, which keeps the
    /// columns dense. A patch that changes nothing returns `Ok(None)`.
    pub fn edit_task(
        &self,
        project_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Option<PendingMutation>, SyncError> {
        patch.validate_for(task_id)?;
        if patch.status.is_some() || patch.order.is_some() {
            return Err(SyncError::Validation("status and order change by moving the card".into()));
        }
        let (inverse, ids) = {
            let mut tasks = self.tasks.lock();
            let task = tasks
                .get(project_id, task_id)
                .ok_or_else(|| SyncError::NotFound(format!("task {task_id}")))?;
            let inverse = patch.inverse_for(task);
            if !tasks.patch(project_id, task_id, &patch) {
                return Ok(None);
            }
            let deps = patch.dependencies.iter().flatten().map(String::as_str);
            (inverse, self.server_ids(std::iter::once(task_id).chain(deps)))
        };

        let gateway = self.gateway.clone();
        let id = task_id.to_string();
        let mut patch = patch;
        Ok(Some(self.dispatch(
            MutationKind::Edit,
            project_id,
            task_id,
            Undo::Patch { task_id: task_id.to_string(), patch: inverse },
            async move {
                let ids = ids.resolve().await;
                let server_id = ids.server_id(&id).ok_or_else(|| unsaved_task(&id))?;
                if let Some(deps) = patch.dependencies.take() {
                    patch.dependencies = Some(ids.dependencies(deps));
                }
                gateway.patch_task(&server_id, &patch).await
            },
            |_, ()| {},
        )))
    }

    /// Delete a task and close the gap it leaves in its column. Unknown ids
    /// are a no-op. Other tasks' dependency lists are left untouched.
    pub fn delete_task(&self, project_id: &str, task_id: &str) -> Option<PendingMutation> {
        let (index, task, updates, inverse, ids) = {
            let mut tasks = self.tasks.lock();
            let (index, task) = tasks.remove(project_id, task_id)?;
            let (updates, inverse) = densify(&mut tasks, project_id);
            let ids = self.server_ids(std::iter::once(task_id).chain(updates.iter().map(|u| u.id.as_str())));
            (index, task, updates, inverse, ids)
        };

        let gateway = self.gateway.clone();
        let id = task_id.to_string();
        Some(self.dispatch(
            MutationKind::Delete,
            project_id,
            task_id,
            Undo::Reinsert { index, task: Box::new(task), positions: inverse },
            async move {
                let ids = ids.resolve().await;
                // A task whose create failed has nothing to delete remotely.
                if let Some(server_id) = ids.server_id(&id) {
                    gateway.delete_task(&server_id).await?;
                }
                gateway.bulk_patch_tasks(&ids.updates(updates)).await
            },
            |_, ()| {},
        ))
    }

    /// Wait until every dispatched mutation has settled.
    pub async fn settle_all(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inflight.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!("Mutation worker ended abnormally: {}", e);
                }
            }
        }
    }

    /// Abandon in-flight mutations (logout). Their local effects stay.
    pub fn abort_all(&self) {
        for handle in self.inflight.lock().drain(..) {
            handle.abort();
        }
    }
}
