//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that adapters implement:
//! - UsageLedger: aggregate record of which model produced stored vectors
//! - MigrationTaskRepository: persistence for migration tasks
//! - EmbeddingProvider: opaque external embedding computation
//! - VectorStore: opaque external vector storage
//! - ModelConfigService: source of the currently configured model

pub mod embedding;
pub mod migration_repository;
pub mod model_config;
pub mod usage_ledger;
pub mod vector_store;

pub use embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
pub use migration_repository::{MigrationFilter, MigrationTaskRepository};
pub use model_config::ModelConfigService;
pub use usage_ledger::UsageLedger;
pub use vector_store::{EmbeddedItem, StoredItem, VectorStore};
