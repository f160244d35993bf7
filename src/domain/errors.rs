//! Domain errors for the embedding migration manager.

use thiserror::Error;
use uuid::Uuid;

use super::models::{EmbeddingModelIdentity, MigrationStatus};

fn format_source(source: Option<&EmbeddingModelIdentity>) -> String {
    source.map_or_else(|| "<untracked>".to_string(), ToString::to_string)
}

/// Domain-level errors that can occur in the migration manager.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(
        "Migration from {} to {target} is already in flight as task {existing}",
        format_source(.source_model.as_ref())
    )]
    Conflict {
        source_model: Option<EmbeddingModelIdentity>,
        target: EmbeddingModelIdentity,
        existing: Uuid,
    },

    #[error("Invalid migration scope: {0}")]
    InvalidScope(String),

    #[error("Invalid state transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        from: MigrationStatus,
        to: MigrationStatus,
    },

    #[error("Embedding provider failed after {attempts} attempt(s): {message}")]
    ProviderFailure { attempts: u32, message: String },

    #[error("Usage ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Migration task not found: {0}")]
    MigrationNotFound(Uuid),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Stable machine-readable code used by the HTTP and CLI surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ProviderFailure { .. } => "provider_failure",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::MigrationNotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Timeout(_) => "timeout",
            Self::DatabaseError(_) | Self::SerializationError(_) | Self::ExecutionFailed(_) => {
                "internal"
            }
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
