//! Embedding model identity.

use serde::{Deserialize, Serialize};

/// Identifies the model that produced a stored vector.
///
/// Two identities are equal only when both the model name and the
/// provider match; `text-embedding-3-small` served by two different
/// providers produces incompatible vector spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmbeddingModelIdentity {
    pub model_name: String,
    pub provider: String,
}

impl EmbeddingModelIdentity {
    pub fn new(model_name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            provider: provider.into(),
        }
    }

    /// Stable single-column key (`provider/model_name`) used by storage adapters.
    pub fn key(&self) -> String {
        format!("{}/{}", self.provider, self.model_name)
    }

    /// Parse a `provider/model_name` key. Model names may themselves contain `/`.
    pub fn from_key(key: &str) -> Option<Self> {
        let (provider, model_name) = key.split_once('/')?;
        if provider.is_empty() || model_name.is_empty() {
            return None;
        }
        Some(Self::new(model_name, provider))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model_name.trim().is_empty() {
            return Err("model_name cannot be empty".to_string());
        }
        if self.provider.trim().is_empty() {
            return Err("provider cannot be empty".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Display for EmbeddingModelIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model_name)
    }
}
