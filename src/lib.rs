//! Reembed - Embedding Model Migration Manager
//!
//! Tracks which embedding model produced the vectors in a store, detects
//! when the configured model has drifted away from what is stored, and
//! re-embeds stored content in the background with pollable progress.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, port traits and the error taxonomy
//! - **Service Layer** (`services`): Drift detection and migration orchestration
//! - **Adapters** (`adapters`): SQLite storage, the OpenAI embedding client and the HTTP API
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use reembed::cli::AppContext;
//! use reembed::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = AppContext::open(ConfigLoader::load()?).await?;
//!     let recommendation = ctx.service.get_recommendation(None).await?;
//!     println!("{}", recommendation.recommendation_text);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, EmbeddingModelIdentity, MigrationRecommendation, MigrationRequest, MigrationScope,
    MigrationStatus, MigrationStrategy, MigrationTask, RecommendationReason, UsageRecord,
};
pub use domain::ports::{
    EmbeddingProvider, MigrationTaskRepository, ModelConfigService, UsageLedger, VectorStore,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{DriftDetector, MigrationOrchestrator, MigrationService, ProgressReporter};
