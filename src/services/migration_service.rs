//! Application-facing facade over drift detection and migration execution.
//!
//! The HTTP and CLI surfaces talk to this type only.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EmbeddingModelIdentity, MigrationRecommendation, MigrationRequest, MigrationTask,
};
use crate::domain::ports::{MigrationFilter, ModelConfigService};
use crate::services::drift_detector::DriftDetector;
use crate::services::migration_orchestrator::MigrationOrchestrator;

/// Housekeeping performed when a process takes ownership of the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub recovered: usize,
    pub archived: u64,
}

pub struct MigrationService {
    detector: DriftDetector,
    orchestrator: MigrationOrchestrator,
    model_config: Arc<dyn ModelConfigService>,
    retention: Option<Duration>,
}

impl MigrationService {
    pub fn new(
        detector: DriftDetector,
        orchestrator: MigrationOrchestrator,
        model_config: Arc<dyn ModelConfigService>,
    ) -> Self {
        Self {
            detector,
            orchestrator,
            model_config,
            retention: None,
        }
    }

    /// Archive terminal tasks older than `days` on startup. Zero disables archiving.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention = (days > 0).then(|| Duration::days(i64::from(days)));
        self
    }

    pub fn orchestrator(&self) -> &MigrationOrchestrator {
        &self.orchestrator
    }

    /// Recover interrupted tasks and archive expired history.
    pub async fn startup(&self) -> DomainResult<StartupReport> {
        let recovered = self.orchestrator.recover_interrupted().await?;
        let archived = match self.retention {
            Some(retention) => self.orchestrator.archive_before(Utc::now() - retention).await?,
            None => 0,
        };
        if recovered > 0 || archived > 0 {
            info!(recovered, archived, "Startup housekeeping finished");
        }
        Ok(StartupReport {
            recovered,
            archived,
        })
    }

    /// Recommendation for `model`, or for the configured model when `None`.
    #[instrument(skip(self))]
    pub async fn get_recommendation(
        &self,
        model: Option<EmbeddingModelIdentity>,
    ) -> DomainResult<MigrationRecommendation> {
        match model {
            Some(model) => {
                model.validate().map_err(DomainError::ValidationFailed)?;
                Ok(self.detector.recommend_for(&model).await)
            }
            None => self.detector.recommend().await,
        }
    }

    /// Switch the configured model and return the recommendation for it.
    #[instrument(skip(self))]
    pub async fn set_current_model(
        &self,
        model: EmbeddingModelIdentity,
    ) -> DomainResult<MigrationRecommendation> {
        model.validate().map_err(DomainError::ValidationFailed)?;
        self.model_config.set_current_model(model.clone()).await?;
        info!(model = %model, "Current embedding model changed");
        Ok(self.detector.recommend_for(&model).await)
    }

    /// Create a task and start it. Returns the running snapshot.
    pub async fn start_migration(&self, request: MigrationRequest) -> DomainResult<MigrationTask> {
        let task = self.orchestrator.create_task(request).await?;
        self.orchestrator.start(task.id).await
    }

    pub async fn get_status(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        self.orchestrator.poll(task_id).await
    }

    pub async fn cancel(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        self.orchestrator.cancel(task_id).await
    }

    pub async fn list(&self, filter: MigrationFilter) -> DomainResult<Vec<MigrationTask>> {
        self.orchestrator.list(filter).await
    }

    pub async fn subscribe(&self, task_id: Uuid) -> DomainResult<watch::Receiver<MigrationTask>> {
        self.orchestrator.progress().subscribe(task_id).await
    }

    /// Block until a task started by this process finishes.
    pub async fn wait(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        self.orchestrator.progress().wait_for_terminal(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::model_config::InMemoryModelConfig;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteMigrationTaskRepository, SqliteUsageLedger,
        SqliteVectorStore,
    };
    use crate::domain::models::{MigrationScope, MigrationStatus, MigrationStrategy};
    use crate::domain::ports::{
        EmbeddingInput, EmbeddingOutput, EmbeddingProvider, MigrationTaskRepository,
    };
    use crate::services::{OrchestratorConfig, ProgressReporter};
    use async_trait::async_trait;

    struct IdleProvider;

    #[async_trait]
    impl EmbeddingProvider for IdleProvider {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn max_batch_size(&self) -> usize {
            16
        }

        async fn embed_batch(
            &self,
            inputs: &[EmbeddingInput],
            _model: &EmbeddingModelIdentity,
        ) -> DomainResult<Vec<EmbeddingOutput>> {
            Ok(inputs
                .iter()
                .map(|input| EmbeddingOutput {
                    id: input.id.clone(),
                    vector: vec![0.0],
                })
                .collect())
        }
    }

    fn target() -> EmbeddingModelIdentity {
        EmbeddingModelIdentity::new("text-embedding-3-large", "openai")
    }

    async fn setup(retention_days: u32) -> (MigrationService, Arc<SqliteMigrationTaskRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteMigrationTaskRepository::new(pool.clone()));
        let ledger = Arc::new(SqliteUsageLedger::new(pool.clone()));
        let store = Arc::new(SqliteVectorStore::new(pool));
        let progress = Arc::new(ProgressReporter::new(repo.clone()));
        let orchestrator = MigrationOrchestrator::new(
            repo.clone(),
            ledger.clone(),
            Arc::new(IdleProvider),
            store,
            progress,
            OrchestratorConfig::default(),
        );
        let model_config = Arc::new(InMemoryModelConfig::new(target()));
        let detector = DriftDetector::new(ledger, model_config.clone());
        let service = MigrationService::new(detector, orchestrator, model_config)
            .with_retention_days(retention_days);
        (service, repo)
    }

    fn orphan(source: &str) -> MigrationTask {
        let mut task = MigrationTask::new(
            Some(EmbeddingModelIdentity::new(source, "openai")),
            target(),
            MigrationStrategy::Replace,
            MigrationScope::All,
            100,
        );
        task.transition_to(MigrationStatus::Running).unwrap();
        task.completed_count = 40;
        task
    }

    fn finished_days_ago(days: i64) -> MigrationTask {
        let mut task = MigrationTask::new(
            None,
            target(),
            MigrationStrategy::Append,
            MigrationScope::All,
            0,
        );
        task.transition_to(MigrationStatus::Running).unwrap();
        task.transition_to(MigrationStatus::Completed).unwrap();
        task.completed_at = Some(Utc::now() - Duration::days(days));
        task
    }

    #[tokio::test]
    async fn test_startup_fails_orphaned_running_tasks() {
        let (service, repo) = setup(0).await;
        let task = orphan("ada-002");
        repo.insert(&task).await.unwrap();

        let report = service.startup().await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.archived, 0);

        let recovered = service.get_status(task.id).await.unwrap();
        assert_eq!(recovered.status, MigrationStatus::Failed);
        assert_eq!(recovered.completed_count, 40);
        assert!(recovered.error.unwrap().contains("interrupted"));

        // Already-failed tasks are not touched twice.
        assert_eq!(service.startup().await.unwrap(), StartupReport::default());
    }

    #[tokio::test]
    async fn test_startup_archives_expired_history() {
        let (service, repo) = setup(30).await;
        let old = finished_days_ago(45);
        let recent = finished_days_ago(2);
        repo.insert(&old).await.unwrap();
        repo.insert(&recent).await.unwrap();

        let report = service.startup().await.unwrap();
        assert_eq!(report.archived, 1);

        let visible = service.list(MigrationFilter::default()).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, recent.id);

        let all = service
            .list(MigrationFilter {
                include_archived: true,
                ..MigrationFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_retention_never_archives() {
        let (service, repo) = setup(0).await;
        repo.insert(&finished_days_ago(400)).await.unwrap();

        let report = service.startup().await.unwrap();
        assert_eq!(report.archived, 0);
        assert_eq!(service.list(MigrationFilter::default()).await.unwrap().len(), 1);
    }
}
