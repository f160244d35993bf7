//! Embedding provider port.
//!
//! The migration loop hands each batch of stored items to a provider and
//! writes whatever vectors come back. How vectors are computed is opaque
//! to the migration manager; only the model identity matters.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::EmbeddingModelIdentity;

/// One stored item to re-embed. `id` is the vector store item id.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub id: String,
    pub text: String,
}

/// A vector produced for the input with the same `id`.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub id: String,
    pub vector: Vec<f32>,
}

/// Produces vectors with a named model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Largest number of inputs sent in one upstream request.
    fn max_batch_size(&self) -> usize;

    /// Embed `inputs` with `model`, one output per input, in input order.
    ///
    /// Batches larger than [`Self::max_batch_size`] are split by the
    /// implementation. A failure fails the whole batch; nothing is written
    /// for a partially embedded batch.
    async fn embed_batch(
        &self,
        inputs: &[EmbeddingInput],
        model: &EmbeddingModelIdentity,
    ) -> DomainResult<Vec<EmbeddingOutput>>;
}
