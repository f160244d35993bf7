use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EmbeddingModelIdentity, MigrationStatus, MigrationTask};

/// Filters for listing migration tasks
#[derive(Default, Debug, Clone)]
pub struct MigrationFilter {
    pub status: Option<MigrationStatus>,
    pub include_archived: bool,
    pub limit: Option<i64>,
}

/// Repository port for migration task persistence
#[async_trait]
pub trait MigrationTaskRepository: Send + Sync {
    /// Insert a new task.
    ///
    /// Fails with `Conflict` if another non-terminal task already covers
    /// the same source/target pair.
    async fn insert(&self, task: &MigrationTask) -> DomainResult<()>;

    /// Get a task by ID
    async fn get(&self, id: Uuid) -> DomainResult<Option<MigrationTask>>;

    /// Persist lifecycle fields (status, counts, timestamps, error).
    ///
    /// Does not touch `cancel_requested`; see `request_cancel`.
    async fn update(&self, task: &MigrationTask) -> DomainResult<()>;

    /// Persist `completed_count` after a committed batch
    async fn save_progress(&self, id: Uuid, completed_count: u64) -> DomainResult<()>;

    /// Flag a non-terminal task for cooperative cancellation.
    ///
    /// Returns `false` if the task is already terminal.
    async fn request_cancel(&self, id: Uuid) -> DomainResult<bool>;

    /// The non-terminal task for a source/target pair, if any
    async fn find_active(
        &self,
        source: Option<&EmbeddingModelIdentity>,
        target: &EmbeddingModelIdentity,
    ) -> DomainResult<Option<MigrationTask>>;

    /// List tasks, newest first
    async fn list(&self, filter: MigrationFilter) -> DomainResult<Vec<MigrationTask>>;

    /// Archive terminal tasks that finished before `cutoff`. Returns the number archived.
    async fn archive_terminal_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}
