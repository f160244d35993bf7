use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{EmbeddingModelIdentity, MigrationStrategy, UsageRecord};

/// Aggregated, per-model record of stored embeddings.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// All records, one per model identity ever used.
    async fn list_records(&self) -> DomainResult<Vec<UsageRecord>>;

    /// The record for one identity, if that model was ever used.
    async fn get_record(&self, identity: &EmbeddingModelIdentity)
        -> DomainResult<Option<UsageRecord>>;

    /// External write path: `count` new vectors were stored at `at`.
    async fn record_usage(
        &self,
        identity: &EmbeddingModelIdentity,
        count: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Account for a committed migration batch.
    ///
    /// `Replace` moves `count` from `source` to `target`; `Append` only adds
    /// to `target`. A `None` source adds to `target` alone.
    async fn apply_migrated_batch(
        &self,
        source: Option<&EmbeddingModelIdentity>,
        target: &EmbeddingModelIdentity,
        count: u64,
        strategy: MigrationStrategy,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;
}
