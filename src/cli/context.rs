//! Wiring shared by every command that touches the database.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use sqlx::SqlitePool;

use crate::adapters::embeddings::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
use crate::adapters::model_config::InMemoryModelConfig;
use crate::adapters::sqlite::{
    initialize_from_config, SqliteMigrationTaskRepository, SqliteUsageLedger, SqliteVectorStore,
};
use crate::domain::models::Config;
use crate::domain::ports::{EmbeddingProvider, MigrationTaskRepository};
use crate::services::{
    DriftDetector, MigrationOrchestrator, MigrationService, OrchestratorConfig, ProgressReporter,
};

/// Database-backed services built from a loaded [`Config`].
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub ledger: Arc<SqliteUsageLedger>,
    pub store: Arc<SqliteVectorStore>,
    pub service: Arc<MigrationService>,
}

impl AppContext {
    /// Open the configured database and wire the OpenAI-compatible provider.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = initialize_from_config(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(
            OpenAiEmbeddingProvider::new(OpenAiEmbeddingConfig::from(&config.embedding))
                .context("Failed to create embedding provider")?,
        );
        Ok(Self::with_provider(config, pool, provider))
    }

    /// Wire services over an already migrated pool.
    pub fn with_provider(
        config: Config,
        pool: SqlitePool,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let repo: Arc<dyn MigrationTaskRepository> =
            Arc::new(SqliteMigrationTaskRepository::new(pool.clone()));
        let ledger = Arc::new(SqliteUsageLedger::new(pool.clone()));
        let store = Arc::new(SqliteVectorStore::new(pool.clone()));
        let model_config = Arc::new(InMemoryModelConfig::new(config.embedding.current_model()));

        let progress = Arc::new(ProgressReporter::new(Arc::clone(&repo)));
        let orchestrator = MigrationOrchestrator::new(
            repo,
            ledger.clone(),
            provider,
            store.clone(),
            progress,
            OrchestratorConfig::from(&config.migration),
        );

        let granularity =
            Duration::seconds(i64::try_from(config.drift.gap_granularity_secs).unwrap_or(i64::MAX));
        let detector = DriftDetector::new(ledger.clone(), model_config.clone())
            .with_gap_granularity(granularity);

        let service = MigrationService::new(detector, orchestrator, model_config)
            .with_retention_days(config.migration.retention_days);

        Self {
            config,
            pool,
            ledger,
            store,
            service: Arc::new(service),
        }
    }
}
