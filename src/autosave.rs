//! Debounced project saver.
//!
//! Inline project edits (recolouring, renaming) are applied to the registry at
//! once and handed to the `AutoSaver`, which writes them back after a quiet
//! period. Patches to the same project within that period are merged into one
//! write. The saver is an explicit worker task: it can be flushed on demand and
//! is cancelled on teardown, dropping whatever has not been written yet.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::SyncError;
use crate::gateway::SyncGateway;
use crate::project::ProjectPatch;

/// Result of writing the queued patches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    pub saved: usize,
    /// `(project id, user-facing message)` for each patch that failed.
    pub failed: Vec<(String, String)>,
}

enum Command {
    Patch { project_id: String, patch: ProjectPatch },
    Flush(oneshot::Sender<SaveReport>),
    Cancel,
}

pub struct AutoSaver {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl AutoSaver {
    pub fn spawn(gateway: Arc<SyncGateway>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(gateway, delay, rx));
        AutoSaver { tx, worker }
    }

    /// Queue a patch and restart the quiet period.
    pub fn schedule(&self, project_id: &str, patch: ProjectPatch) -> Result<(), SyncError> {
        self.tx
            .send(Command::Patch { project_id: project_id.to_string(), patch })
            .map_err(|_| SyncError::Transient("autosave has been cancelled".into()))
    }

    /// Write everything queued now.
    pub async fn flush(&self) -> Result<SaveReport, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .map_err(|_| SyncError::Transient("autosave has been cancelled".into()))?;
        rx.await.map_err(|_| SyncError::Transient("autosave stopped before flushing".into()))
    }

    /// Stop the worker, discarding unsaved patches.
    pub fn cancel(&self) {
        if self.tx.send(Command::Cancel).is_err() {
            self.worker.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run(gateway: Arc<SyncGateway>, delay: Duration, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut queued: BTreeMap<String, ProjectPatch> = BTreeMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Patch { project_id, patch }) => {
                    queued.entry(project_id).or_default().merge(patch);
                    deadline = Some(Instant::now() + delay);
                }
                Some(Command::Flush(reply)) => {
                    let report = save_all(&gateway, &mut queued).await;
                    deadline = None;
                    let _ = reply.send(report);
                }
                Some(Command::Cancel) | None => {
                    if !queued.is_empty() {
                        tracing::debug!("Autosave cancelled with {} unsaved projects", queued.len());
                    }
                    return;
                }
            },
            _ = timer => {
                save_all(&gateway, &mut queued).await;
                deadline = None;
            }
        }
    }
}

async fn save_all(gateway: &SyncGateway, queued: &mut BTreeMap<String, ProjectPatch>) -> SaveReport {
    let mut report = SaveReport::default();
    for (project_id, patch) in std::mem::take(queued) {
        match gateway.patch_project(&project_id, &patch).await {
            Ok(()) => {
                tracing::debug!("Autosaved project {}", project_id);
                report.saved += 1;
            }
            Err(e) => {
                tracing::warn!("Autosave of project {} failed: {}", project_id, e);
                report.failed.push((project_id, e.user_message()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::project::ProjectDraft;

    async fn setup() -> (Arc<MemoryStore>, Arc<SyncGateway>, String) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(SyncGateway::new(store.clone(), Duration::from_secs(5)));
        let id = gateway.create_project(ProjectDraft::new("demo_user", "Orbit")).await.unwrap().project.id;
        (store, gateway, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_patches_are_debounced_and_merged() {
        let (_, gateway, id) = setup().await;
        let saver = AutoSaver::spawn(gateway.clone(), Duration::from_millis(500));
        saver.schedule(&id, ProjectPatch::color(Some("#123456".into()))).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        saver.schedule(&id, ProjectPatch::title("Renamed")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let unsaved = gateway.get_project(&id).await.unwrap();
        assert_eq!(unsaved.title, "Orbit");

        tokio::time::sleep(Duration::from_millis(400)).await;
        let saved = gateway.get_project(&id).await.unwrap();
        assert_eq!(saved.title, "Renamed");
        assert_eq!(saved.color.as_deref(), Some("#123456"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let (_, gateway, id) = setup().await;
        let saver = AutoSaver::spawn(gateway.clone(), Duration::from_secs(60));
        saver.schedule(&id, ProjectPatch::title("Now")).unwrap();
        let report = saver.flush().await.unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(gateway.get_project(&id).await.unwrap().title, "Now");
        assert_eq!(saver.flush().await.unwrap(), SaveReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_patches() {
        let (_, gateway, id) = setup().await;
        let saver = AutoSaver::spawn(gateway.clone(), Duration::from_millis(500));
        saver.schedule(&id, ProjectPatch::title("Never")).unwrap();
        saver.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!saver.is_running());
        assert_eq!(gateway.get_project(&id).await.unwrap().title, "Orbit");
        assert!(saver.schedule(&id, ProjectPatch::title("Late")).is_err());
    }

    #[tokio::test]
    async fn test_failed_save_is_reported() {
        let (_, gateway, _) = setup().await;
        let saver = AutoSaver::spawn(gateway, Duration::from_secs(60));
        saver.schedule("missing", ProjectPatch::title("x")).unwrap();
        let report = saver.flush().await.unwrap();
        assert_eq!(report.saved, 0);
        assert_eq!(report.failed.len(), 1);
    }
}
