use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EmbeddingModelIdentity, MigrationScope, MigrationStrategy};

/// Content stored alongside a vector, as needed for re-embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub item_id: String,
    pub content: String,
}

/// A freshly computed vector for a stored item.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedItem {
    pub item_id: String,
    pub vector: Vec<f32>,
}

/// Opaque vector store the migration writes into.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Next page of items embedded by `source`, ordered by item id.
    ///
    /// Items with ids `<= after` are skipped. A `None` source selects items
    /// with no tracked embedding model.
    async fn fetch_batch(
        &self,
        source: Option<&EmbeddingModelIdentity>,
        scope: &MigrationScope,
        after: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<StoredItem>>;

    /// Durably write a batch. Either every vector is committed or none is.
    async fn write(
        &self,
        target: &EmbeddingModelIdentity,
        source: Option<&EmbeddingModelIdentity>,
        vectors: &[EmbeddedItem],
        strategy: MigrationStrategy,
    ) -> DomainResult<()>;

    /// Number of current (non-superseded) vectors for a model.
    async fn count_items(&self, model: Option<&EmbeddingModelIdentity>) -> DomainResult<u64>;
}
