use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::EmbeddingModelIdentity;

/// Source of the currently configured embedding model.
#[async_trait]
pub trait ModelConfigService: Send + Sync {
    async fn current_model(&self) -> DomainResult<EmbeddingModelIdentity>;

    async fn set_current_model(&self, identity: EmbeddingModelIdentity) -> DomainResult<()>;
}
