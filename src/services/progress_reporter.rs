//! Pull-based progress channel for migration tasks.
//!
//! Every lifecycle change and committed batch is published here as an
//! immutable [`MigrationTask`] snapshot. Observers either poll
//! ([`ProgressReporter::poll`]) or subscribe to a `watch` channel; both see
//! whole snapshots, never a half-updated task. Polling falls back to the
//! repository when no snapshot is held, so a client that reconnects after
//! a restart still gets the persisted state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::trace;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MigrationTask;
use crate::domain::ports::MigrationTaskRepository;

pub struct ProgressReporter {
    repo: Arc<dyn MigrationTaskRepository>,
    channels: RwLock<HashMap<Uuid, watch::Sender<MigrationTask>>>,
}

impl ProgressReporter {
    pub fn new(repo: Arc<dyn MigrationTaskRepository>) -> Self {
        Self {
            repo,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Publish a snapshot. Terminal snapshots close the channel after delivery.
    pub fn publish(&self, task: &MigrationTask) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(sender) = channels.get(&task.id) {
            sender.send_replace(task.clone());
        } else if !task.is_terminal() {
            let (sender, _) = watch::channel(task.clone());
            channels.insert(task.id, sender);
        }

        if task.is_terminal() {
            channels.remove(&task.id);
        }

        trace!(
            task_id = %task.id,
            status = task.status.as_str(),
            completed = task.completed_count,
            total = task.total_count,
            "Published migration snapshot"
        );
    }

    /// Flag the live snapshot as cancel-requested without touching its counters.
    pub fn mark_cancel_requested(&self, task_id: Uuid) -> Option<MigrationTask> {
        let channels = self
            .channels
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let sender = channels.get(&task_id)?;
        sender.send_modify(|task| task.cancel_requested = true);
        let snapshot = sender.borrow().clone();
        Some(snapshot)
    }

    /// Current snapshot of a task. Read-only; safe for any number of callers.
    pub async fn poll(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        if let Some(snapshot) = self.cached(task_id) {
            return Ok(snapshot);
        }
        self.repo
            .get(task_id)
            .await?
            .ok_or(DomainError::MigrationNotFound(task_id))
    }

    /// Subscribe to snapshots of a task.
    ///
    /// For tasks with no live channel (terminal, or owned by another
    /// process) the receiver holds the persisted snapshot and never changes.
    pub async fn subscribe(&self, task_id: Uuid) -> DomainResult<watch::Receiver<MigrationTask>> {
        if let Some(receiver) = self.live_receiver(task_id) {
            return Ok(receiver);
        }
        let task = self
            .repo
            .get(task_id)
            .await?
            .ok_or(DomainError::MigrationNotFound(task_id))?;
        let (_, receiver) = watch::channel(task);
        Ok(receiver)
    }

    /// Wait for a task owned by this process to reach a terminal state.
    pub async fn wait_for_terminal(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        let mut receiver = self.subscribe(task_id).await?;
        let outcome = receiver
            .wait_for(MigrationTask::is_terminal)
            .await
            .map(|snapshot| MigrationTask::clone(&snapshot));
        match outcome {
            Ok(snapshot) => Ok(snapshot),
            // Channel closed on a non-terminal value: reread the persisted state.
            Err(_) => self.poll(task_id).await,
        }
    }

    /// Number of tasks with a live channel.
    pub fn live_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn cached(&self, task_id: Uuid) -> Option<MigrationTask> {
        self.channels
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&task_id)
            .map(|sender| sender.borrow().clone())
    }

    fn live_receiver(&self, task_id: Uuid) -> Option<watch::Receiver<MigrationTask>> {
        self.channels
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&task_id)
            .map(watch::Sender::subscribe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteMigrationTaskRepository};
    use crate::domain::models::{
        EmbeddingModelIdentity, MigrationScope, MigrationStatus, MigrationStrategy,
    };

    async fn reporter() -> (ProgressReporter, Arc<SqliteMigrationTaskRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteMigrationTaskRepository::new(pool));
        (ProgressReporter::new(repo.clone()), repo)
    }

    fn task() -> MigrationTask {
        MigrationTask::new(
            Some(EmbeddingModelIdentity::new("ada-002", "openai")),
            EmbeddingModelIdentity::new("text-embedding-3-small", "openai"),
            MigrationStrategy::Replace,
            MigrationScope::All,
            10,
        )
    }

    #[tokio::test]
    async fn test_poll_prefers_live_snapshot() {
        let (reporter, repo) = reporter().await;
        let mut task = task();
        repo.insert(&task).await.unwrap();
        reporter.publish(&task);

        task.transition_to(MigrationStatus::Running).unwrap();
        task.record_progress(4).unwrap();
        reporter.publish(&task);

        // The repository still holds the pending row.
        let polled = reporter.poll(task.id).await.unwrap();
        assert_eq!(polled.status, MigrationStatus::Running);
        assert_eq!(polled.completed_count, 4);
        assert_eq!(reporter.live_count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_snapshot_closes_channel() {
        let (reporter, repo) = reporter().await;
        let mut task = task();
        task.transition_to(MigrationStatus::Running).unwrap();
        repo.insert(&task).await.unwrap();
        reporter.publish(&task);

        let mut receiver = reporter.subscribe(task.id).await.unwrap();
        task.record_progress(10).unwrap();
        task.transition_to(MigrationStatus::Completed).unwrap();
        repo.update(&task).await.unwrap();
        reporter.publish(&task);

        let seen = receiver.wait_for(MigrationTask::is_terminal).await.unwrap();
        assert_eq!(seen.completed_count, 10);
        drop(seen);
        assert_eq!(reporter.live_count(), 0);
        assert_eq!(
            reporter.poll(task.id).await.unwrap().status,
            MigrationStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_mark_cancel_requested_keeps_counters() {
        let (reporter, _) = reporter().await;
        let mut task = task();
        task.transition_to(MigrationStatus::Running).unwrap();
        task.record_progress(3).unwrap();
        reporter.publish(&task);

        let flagged = reporter.mark_cancel_requested(task.id).unwrap();
        assert!(flagged.cancel_requested);
        assert_eq!(flagged.completed_count, 3);
        assert_eq!(flagged.status, MigrationStatus::Running);

        assert!(reporter.mark_cancel_requested(uuid::Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_wait_for_terminal_on_persisted_task() {
        let (reporter, repo) = reporter().await;
        let mut task = task();
        task.transition_to(MigrationStatus::Cancelled).unwrap();
        repo.insert(&task).await.unwrap();

        let done = reporter.wait_for_terminal(task.id).await.unwrap();
        assert_eq!(done.status, MigrationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (reporter, _) = reporter().await;
        let id = uuid::Uuid::new_v4();
        assert!(matches!(
            reporter.poll(id).await,
            Err(DomainError::MigrationNotFound(missing)) if missing == id
        ));
        assert!(reporter.subscribe(id).await.is_err());
    }
}
