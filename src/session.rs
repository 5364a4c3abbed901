//! Session context.
//!
//! A `Session` owns everything one logged-in user works with: the persistence
//! backend chosen at start, the gateway, the task collection shared with the
//! mutation coordinator, the project registry and the autosaver. It is built
//! on login and torn down on logout; nothing in the crate reaches for global
//! state.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::autosave::{AutoSaver, SaveReport};
use crate::board::{Board, DependencyReport, TaskFilter};
use crate::collection::TaskCollection;
use crate::config::Config;
use crate::coordinator::{Coordinator, Notice, SharedTasks};
use crate::error::SyncError;
use crate::extract::OutlineExtractor;
use crate::gateway::{ProjectLaunch, SyncGateway};
use crate::identity::Identity;
use crate::persistence::{open_backend, Persistence};
use crate::project::{Project, ProjectDraft, ProjectPatch, ProjectRegistry};
use crate::task::Task;

pub struct Session {
    config: Config,
    identity: Identity,
    gateway: Arc<SyncGateway>,
    tasks: SharedTasks,
    coordinator: Coordinator,
    notices: mpsc::UnboundedReceiver<Notice>,
    registry: ProjectRegistry,
    autosaver: AutoSaver,
}

impl Session {
    /// Check the credentials against the configured pair and start a session.
    pub fn login(config: Config, username: &str, password: &str) -> Result<Self, SyncError> {
        let identity = Identity::login(username, password, &config.credentials)
            .map_err(|e| SyncError::Validation(e.to_string()))?;
        Self::start(config, identity)
    }

    /// Open the configured backend and start a session on it.
    pub fn start(config: Config, identity: Identity) -> Result<Self, SyncError> {
        let store = open_backend(&config)?;
        Ok(Self::with_store(config, identity, store))
    }

    /// Start a session on an already opened backend.
    pub fn with_store(config: Config, identity: Identity, store: Arc<dyn Persistence>) -> Self {
        let gateway = Arc::new(
            SyncGateway::new(store, config.timeout()).with_extractor(Arc::new(OutlineExtractor::new())),
        );
        let tasks: SharedTasks = Arc::new(Mutex::new(TaskCollection::new()));
        let (coordinator, notices) = Coordinator::new(tasks.clone(), gateway.clone(), config.failure_policy);
        let autosaver = AutoSaver::spawn(gateway.clone(), config.autosave_delay());
        tracing::info!("Session started for {}", identity.user_id());
        Session { config, identity, gateway, tasks, coordinator, notices, registry: ProjectRegistry::new(), autosaver }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn gateway(&self) -> &Arc<SyncGateway> {
        &self.gateway
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    /// Reload the project list of the logged-in user.
    pub async fn refresh(&mut self) -> Result<usize, SyncError> {
        let projects = self.gateway.list_projects(self.identity.user_id()).await?;
        let n = projects.len();
        self.registry.set_all(projects);
        Ok(n)
    }

    /// Resolve a project (id, id prefix or title), load its tasks and select it.
    pub async fn open_project(&mut self, identifier: &str) -> Result<Project, SyncError> {
        let id = self.registry.resolve(identifier)?.id.clone();
        let (project, tasks) = self.gateway.get_project_with_tasks(&id).await?;
        tracing::debug!("Loaded {} tasks for project {}", tasks.len(), id);
        self.tasks.lock().set_all(&id, tasks);
        self.registry.select(Some(&id));
        Ok(project)
    }

    /// Create a project owned by the current user, seeding tasks from the
    /// attached document if any.
    pub async fn launch_project(&mut self, mut draft: ProjectDraft) -> Result<ProjectLaunch, SyncError> {
        draft.uid = self.identity.user_id().to_string();
        let launch = self.gateway.create_project(draft).await?;
        self.registry.add(launch.project.clone())?;
        tracing::info!(
            "Launched project {} with {} seeded tasks",
            launch.project.title,
            launch.tasks_created
        );
        Ok(launch)
    }

    /// Delete a project and its tasks remotely, then forget both locally.
    /// Local state is only touched once the cascade succeeded.
    pub async fn delete_project(&mut self, id: &str) -> Result<usize, SyncError> {
        let removed = self.gateway.delete_project(id).await?;
        let mut tasks = self.tasks.lock();
        self.registry.remove(id, &mut tasks);
        Ok(removed)
    }

    /// Inline project edit: applied to the registry now, written back by the
    /// autosaver after the quiet period.
    pub fn patch_project(&mut self, id: &str, patch: ProjectPatch) -> Result<bool, SyncError> {
        patch.validate()?;
        if self.registry.get(id).is_none() {
            return Err(SyncError::NotFound(format!("project {id}")));
        }
        if !self.registry.patch(id, &patch) {
            return Ok(false);
        }
        self.autosaver.schedule(id, patch)?;
        Ok(true)
    }

    /// Snapshot of a project's tasks.
    pub fn tasks(&self, project_id: &str) -> Vec<Task> {
        self.tasks.lock().tasks(project_id).to_vec()
    }

    pub fn resolve_task(&self, project_id: &str, identifier: &str) -> Result<Task, SyncError> {
        self.tasks.lock().resolve(project_id, identifier).cloned()
    }

    /// Columns and statistics, optionally narrowed by a filter.
    pub fn board(&self, project_id: &str, filter: &TaskFilter) -> Board {
        let tasks = self.tasks(project_id);
        if filter.is_empty() {
            Board::project(&tasks)
        } else {
            Board::project(&filter.apply(&tasks, Utc::now()))
        }
    }

    pub fn dependencies(&self, project_id: &str, task_id: &str) -> Result<DependencyReport, SyncError> {
        let tasks = self.tasks(project_id);
        let task = tasks
            .iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| SyncError::NotFound(format!("task {task_id}")))?;
        Ok(DependencyReport::build(task, &tasks))
    }

    /// Wait for every dispatched task mutation to settle.
    pub async fn settle(&self) {
        self.coordinator.settle_all().await;
    }

    /// Write queued project patches now.
    pub async fn flush(&self) -> Result<SaveReport, SyncError> {
        self.autosaver.flush().await
    }

    /// Failure notices received so far.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }

    /// Logout. Cancels the autosaver and in-flight mutations, clears local
    /// state and returns the notices nobody read.
    pub fn teardown(mut self) -> Vec<Notice> {
        self.autosaver.cancel();
        self.coordinator.abort_all();
        let notices = self.drain_notices();
        self.registry.clear();
        self.tasks.lock().clear();
        tracing::info!("Session for {} ended", self.identity.user_id());
        notices
    }
}
