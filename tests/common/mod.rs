//! Common test utilities for integration tests
//!
//! Builds the real SQLite-backed adapters over an in-memory database and
//! pairs them with a scripted embedding provider whose failures and pauses
//! are controlled by the test.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use reembed::adapters::model_config::InMemoryModelConfig;
use reembed::adapters::sqlite::{
    create_migrated_test_pool, SqliteMigrationTaskRepository, SqliteUsageLedger,
    SqliteVectorStore,
};
use reembed::domain::errors::{DomainError, DomainResult};
use reembed::domain::models::{
    EmbeddingModelIdentity, MigrationRequest, MigrationStatus, MigrationStrategy, MigrationTask,
    ScopeKind, UsageRecord,
};
use reembed::domain::ports::{
    EmbeddingInput, EmbeddingOutput, EmbeddingProvider, StoredItem, UsageLedger,
};
use reembed::services::{
    DriftDetector, MigrationOrchestrator, MigrationService, OrchestratorConfig, ProgressReporter,
    RetryPolicy,
};

pub fn small_model() -> EmbeddingModelIdentity {
    EmbeddingModelIdentity::new("text-embedding-3-small", "openai")
}

pub fn large_model() -> EmbeddingModelIdentity {
    EmbeddingModelIdentity::new("text-embedding-3-large", "openai")
}

pub fn item_id(i: usize) -> String {
    format!("item-{i:04}")
}

/// Embedding provider driven by the test.
///
/// Vectors are `[call number, input length]` so tests can tell which call
/// produced a stored vector.
#[derive(Default)]
pub struct ScriptedProvider {
    calls: AtomicUsize,
    /// Every call whose inputs include this id fails.
    fail_on_item: Option<String>,
    /// This call (1-based) signals `reached` and waits for `release`.
    pause_on_call: Option<usize>,
    /// This call (1-based) fails; the next attempt succeeds.
    fail_on_call: Option<usize>,
    /// This call and every later one never return.
    hang_from_call: Option<usize>,
    pub reached: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(item: impl Into<String>) -> Self {
        Self {
            fail_on_item: Some(item.into()),
            ..Self::default()
        }
    }

    pub fn pausing_on_call(call: usize) -> Self {
        Self {
            pause_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn failing_once_on_call(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn hanging_from_call(call: usize) -> Self {
        Self {
            hang_from_call: Some(call),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn max_batch_size(&self) -> usize {
        1000
    }

    async fn embed_batch(
        &self,
        inputs: &[EmbeddingInput],
        _model: &EmbeddingModelIdentity,
    ) -> DomainResult<Vec<EmbeddingOutput>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.pause_on_call == Some(call) {
            self.reached.notify_one();
            self.release.notified().await;
        }

        if self.hang_from_call.is_some_and(|from| call >= from) {
            std::future::pending::<()>().await;
        }

        if self.fail_on_call == Some(call) {
            return Err(DomainError::ProviderFailure {
                attempts: 1,
                message: "connection reset".to_string(),
            });
        }

        if let Some(bad) = &self.fail_on_item {
            if inputs.iter().any(|input| &input.id == bad) {
                return Err(DomainError::ProviderFailure {
                    attempts: 1,
                    message: "rate limited".to_string(),
                });
            }
        }

        Ok(inputs
            .iter()
            .map(|input| EmbeddingOutput {
                id: input.id.clone(),
                vector: vec![call as f32, input.text.len() as f32],
            })
            .collect())
    }
}

/// Usage ledger whose batch accounting fails a set number of times.
pub struct FlakyLedger {
    inner: Arc<SqliteUsageLedger>,
    faults_left: AtomicUsize,
    apply_calls: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: Arc<SqliteUsageLedger>, faults: usize) -> Self {
        Self {
            inner,
            faults_left: AtomicUsize::new(faults),
            apply_calls: AtomicUsize::new(0),
        }
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageLedger for FlakyLedger {
    async fn list_records(&self) -> DomainResult<Vec<UsageRecord>> {
        self.inner.list_records().await
    }

    async fn get_record(
        &self,
        identity: &EmbeddingModelIdentity,
    ) -> DomainResult<Option<UsageRecord>> {
        self.inner.get_record(identity).await
    }

    async fn record_usage(
        &self,
        identity: &EmbeddingModelIdentity,
        count: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.inner.record_usage(identity, count, at).await
    }

    async fn apply_migrated_batch(
        &self,
        source: Option<&EmbeddingModelIdentity>,
        target: &EmbeddingModelIdentity,
        count: u64,
        strategy: MigrationStrategy,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let faulted = self
            .faults_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if faulted {
            return Err(DomainError::LedgerUnavailable("disk full".to_string()));
        }
        self.inner
            .apply_migrated_batch(source, target, count, strategy, at)
            .await
    }
}

pub fn test_config(batch_size: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        batch_size,
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        provider_timeout: Duration::from_secs(5),
    }
}

/// Real adapters over one in-memory database.
pub struct Harness {
    pub repo: Arc<SqliteMigrationTaskRepository>,
    pub ledger: Arc<SqliteUsageLedger>,
    /// The ledger the orchestrator writes through.
    pub batch_ledger: Arc<FlakyLedger>,
    pub store: Arc<SqliteVectorStore>,
    pub provider: Arc<ScriptedProvider>,
    pub progress: Arc<ProgressReporter>,
    pub orchestrator: MigrationOrchestrator,
}

impl Harness {
    pub async fn new(provider: ScriptedProvider, batch_size: usize) -> Self {
        Self::with_config(provider, test_config(batch_size), 0).await
    }

    /// A harness whose ledger fails the first `ledger_faults` batch updates.
    pub async fn with_config(
        provider: ScriptedProvider,
        config: OrchestratorConfig,
        ledger_faults: usize,
    ) -> Self {
        let pool = create_migrated_test_pool()
            .await
            .expect("Failed to create test pool");
        let repo = Arc::new(SqliteMigrationTaskRepository::new(pool.clone()));
        let ledger = Arc::new(SqliteUsageLedger::new(pool.clone()));
        let batch_ledger = Arc::new(FlakyLedger::new(ledger.clone(), ledger_faults));
        let store = Arc::new(SqliteVectorStore::new(pool));
        let provider = Arc::new(provider);
        let progress = Arc::new(ProgressReporter::new(repo.clone()));

        let orchestrator = MigrationOrchestrator::new(
            repo.clone(),
            batch_ledger.clone(),
            provider.clone(),
            store.clone(),
            progress.clone(),
            config,
        );

        Self {
            repo,
            ledger,
            batch_ledger,
            store,
            provider,
            progress,
            orchestrator,
        }
    }

    /// Store `count` items under `model` and credit the ledger.
    pub async fn seed(&self, model: &EmbeddingModelIdentity, count: usize, at: DateTime<Utc>) {
        let items: Vec<(StoredItem, Option<Vec<f32>>)> = (0..count)
            .map(|i| {
                (
                    StoredItem {
                        item_id: item_id(i),
                        content: format!("document number {i}"),
                    },
                    Some(vec![0.0, 0.0]),
                )
            })
            .collect();
        self.store
            .upsert_items(Some(model), &items)
            .await
            .expect("Failed to seed vector store");
        self.ledger
            .record_usage(model, count as u64, at)
            .await
            .expect("Failed to seed ledger");
    }

    /// A service over the same adapters with `current` configured.
    pub fn service(&self, current: EmbeddingModelIdentity) -> MigrationService {
        let model_config = Arc::new(InMemoryModelConfig::new(current));
        let detector = DriftDetector::new(self.ledger.clone(), model_config.clone());
        MigrationService::new(detector, self.orchestrator.clone(), model_config)
    }

    /// Wait for a task started by this harness to finish, with a deadline.
    pub async fn wait(&self, task_id: uuid::Uuid) -> MigrationTask {
        tokio::time::timeout(
            Duration::from_secs(10),
            self.progress.wait_for_terminal(task_id),
        )
        .await
        .expect("migration did not finish in time")
        .expect("failed to read migration")
    }
}

pub fn request(strategy: MigrationStrategy) -> MigrationRequest {
    MigrationRequest {
        source: Some(small_model()),
        target: large_model(),
        strategy,
        scope: ScopeKind::All,
        subset: None,
    }
}

pub fn assert_status(task: &MigrationTask, status: MigrationStatus) {
    assert_eq!(
        task.status, status,
        "expected {status:?}, got {:?} (error: {:?})",
        task.status, task.error
    );
}
