//! Domain models for the embedding migration manager.

pub mod config;
pub mod migration;
pub mod model_identity;
pub mod recommendation;
pub mod usage;

pub use config::{
    Config, DatabaseConfig, DriftConfig, EmbeddingConfig, LoggingConfig, MigrationConfig,
    RotationPolicy, ServerConfig,
};
pub use migration::{
    MigrationRequest, MigrationScope, MigrationStatus, MigrationStrategy, MigrationTask,
    ScopeKind, SubsetSelector,
};
pub use model_identity::EmbeddingModelIdentity;
pub use recommendation::{MigrationRecommendation, MissingPeriod, RecommendationReason};
pub use usage::UsageRecord;
