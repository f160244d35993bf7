//! In-process model configuration service.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::EmbeddingModelIdentity;
use crate::domain::ports::ModelConfigService;

/// Holds the configured current model for the lifetime of the process.
///
/// Seeded from `embedding.model_name`/`embedding.provider`; changes made
/// through [`ModelConfigService::set_current_model`] are not written back
/// to the configuration file.
pub struct InMemoryModelConfig {
    current: RwLock<EmbeddingModelIdentity>,
}

impl InMemoryModelConfig {
    pub fn new(initial: EmbeddingModelIdentity) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl ModelConfigService for InMemoryModelConfig {
    async fn current_model(&self) -> DomainResult<EmbeddingModelIdentity> {
        Ok(self.current.read().await.clone())
    }

    async fn set_current_model(&self, identity: EmbeddingModelIdentity) -> DomainResult<()> {
        identity.validate().map_err(DomainError::ValidationFailed)?;
        *self.current.write().await = identity;
        Ok(())
    }
}
