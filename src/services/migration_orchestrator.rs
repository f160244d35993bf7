//! Migration orchestrator.
//!
//! Creates, starts and cancels migration tasks and owns the background
//! execution loop that re-embeds a source model's items batch by batch.
//! The loop is the only writer of a running task; every committed batch
//! is persisted before it is counted and then published to the
//! [`ProgressReporter`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    MigrationConfig, MigrationRequest, MigrationScope, MigrationStatus,
    MigrationTask,
};
use crate::domain::ports::{
    EmbeddedItem, EmbeddingInput, EmbeddingProvider, MigrationFilter, MigrationTaskRepository,
    UsageLedger, VectorStore,
};
use crate::services::progress_reporter::ProgressReporter;
use crate::services::retry::{RetryExhausted, RetryPolicy};

/// Execution tuning for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Items per batch. Bounds memory held by one iteration.
    pub batch_size: usize,
    /// Retry policy applied to each batch.
    pub retry: RetryPolicy,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&MigrationConfig::default())
    }
}

impl From<&MigrationConfig> for OrchestratorConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::from_config(config),
            provider_timeout: Duration::from_secs(config.provider_timeout_secs),
        }
    }
}

/// Result of one committed batch.
struct BatchOutcome {
    processed: u64,
    last_item_id: Option<String>,
}

#[derive(Clone)]
pub struct MigrationOrchestrator {
    repo: Arc<dyn MigrationTaskRepository>,
    ledger: Arc<dyn UsageLedger>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    progress: Arc<ProgressReporter>,
    config: OrchestratorConfig,
    /// Serializes create/start/cancel so uniqueness and transition checks are atomic.
    lifecycle: Arc<tokio::sync::Mutex<()>>,
    loops: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl MigrationOrchestrator {
    pub fn new(
        repo: Arc<dyn MigrationTaskRepository>,
        ledger: Arc<dyn UsageLedger>,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        progress: Arc<ProgressReporter>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repo,
            ledger,
            provider,
            store,
            progress,
            config,
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            loops: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.progress
    }

    /// Create a pending task.
    #[instrument(skip(self, request), fields(target = %request.target))]
    pub async fn create_task(&self, request: MigrationRequest) -> DomainResult<MigrationTask> {
        request
            .target
            .validate()
            .map_err(|e| DomainError::ValidationFailed(format!("target: {e}")))?;
        if let Some(source) = &request.source {
            source
                .validate()
                .map_err(|e| DomainError::ValidationFailed(format!("source: {e}")))?;
            if source == &request.target {
                return Err(DomainError::ValidationFailed(
                    "source and target are the same model".to_string(),
                ));
            }
        }
        let scope = MigrationScope::resolve(request.scope, request.subset)?;

        let _guard = self.lifecycle.lock().await;

        if let Some(existing) = self
            .repo
            .find_active(request.source.as_ref(), &request.target)
            .await?
        {
            return Err(DomainError::Conflict {
                source_model: request.source,
                target: request.target,
                existing: existing.id,
            });
        }

        let source_count = match &request.source {
            Some(source) => self
                .ledger
                .get_record(source)
                .await
                .map_err(|e| match e {
                    DomainError::LedgerUnavailable(_) => e,
                    other => DomainError::LedgerUnavailable(other.to_string()),
                })?
                .map_or(0, |record| record.embedding_count),
            None => 0,
        };
        let total_count = match &scope {
            MigrationScope::All => source_count,
            MigrationScope::Subset { selector } => {
                let distinct: HashSet<&str> = selector
                    .item_ids
                    .iter()
                    .map(|id| id.trim())
                    .filter(|id| !id.is_empty())
                    .collect();
                source_count.min(distinct.len() as u64)
            }
        };

        let task = MigrationTask::new(
            request.source,
            request.target,
            request.strategy,
            scope,
            total_count,
        );
        self.repo.insert(&task).await?;
        self.progress.publish(&task);

        info!(
            task_id = %task.id,
            total = task.total_count,
            strategy = task.strategy.as_str(),
            scope = task.scope.kind().as_str(),
            "Created migration task"
        );
        Ok(task)
    }

    /// Move a pending task to running and launch its execution loop.
    ///
    /// Returns as soon as the transition is persisted.
    #[instrument(skip(self))]
    pub async fn start(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        let _guard = self.lifecycle.lock().await;

        let mut task = self.load(task_id).await?;
        task.transition_to(MigrationStatus::Running)?;
        self.repo.update(&task).await?;
        self.progress.publish(&task);

        let this = self.clone();
        let snapshot = task.clone();
        let handle = tokio::spawn(async move { this.run(snapshot).await });
        self.loops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(task_id, handle);

        info!(task_id = %task_id, total = task.total_count, "Started migration");
        Ok(task)
    }

    /// Current snapshot of a task.
    pub async fn poll(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        self.progress.poll(task_id).await
    }

    /// Request cooperative cancellation.
    ///
    /// A pending task is cancelled immediately. A running task is flagged and
    /// stops after its in-flight batch. Terminal tasks cannot be cancelled.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        let _guard = self.lifecycle.lock().await;

        let mut task = self.load(task_id).await?;
        match task.status {
            MigrationStatus::Pending => {
                task.transition_to(MigrationStatus::Cancelled)?;
                task.cancel_requested = true;
                self.repo.request_cancel(task_id).await?;
                self.repo.update(&task).await?;
                self.progress.publish(&task);
                info!(task_id = %task_id, "Cancelled pending migration");
                Ok(task)
            }
            MigrationStatus::Running => {
                if !self.repo.request_cancel(task_id).await? {
                    // Finished between the read and the flag.
                    return self.poll(task_id).await;
                }
                info!(task_id = %task_id, "Cancellation requested for running migration");
                let snapshot = self.progress.mark_cancel_requested(task_id);
                match snapshot {
                    Some(snapshot) => Ok(snapshot),
                    None => {
                        task.cancel_requested = true;
                        Ok(task)
                    }
                }
            }
            status => Err(DomainError::InvalidTransition {
                from: status,
                to: MigrationStatus::Cancelled,
            }),
        }
    }

    /// Fail tasks left `running` by a process that is gone.
    ///
    /// Partial progress is kept so an operator can decide whether to retry.
    pub async fn recover_interrupted(&self) -> DomainResult<usize> {
        let _guard = self.lifecycle.lock().await;

        let running = self
            .repo
            .list(MigrationFilter {
                status: Some(MigrationStatus::Running),
                include_archived: true,
                limit: None,
            })
            .await?;

        let owned: HashSet<Uuid> = self
            .loops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .copied()
            .collect();

        let mut recovered = 0;
        for mut task in running.into_iter().filter(|t| !owned.contains(&t.id)) {
            task.fail(format!(
                "interrupted: execution stopped at {}/{} items before completion",
                task.completed_count, task.total_count
            ))?;
            self.repo.update(&task).await?;
            self.progress.publish(&task);
            warn!(task_id = %task.id, completed = task.completed_count, "Recovered interrupted migration");
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Number of execution loops owned by this orchestrator that are still alive.
    pub fn active_loops(&self) -> usize {
        let mut loops = self
            .loops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loops.retain(|_, handle| !handle.is_finished());
        loops.len()
    }

    /// History listing, newest first.
    pub async fn list(&self, filter: MigrationFilter) -> DomainResult<Vec<MigrationTask>> {
        self.repo.list(filter).await
    }

    /// Archive terminal tasks that finished before `cutoff`.
    pub async fn archive_before(&self, cutoff: chrono::DateTime<Utc>) -> DomainResult<u64> {
        self.repo.archive_terminal_before(cutoff).await
    }

    async fn load(&self, task_id: Uuid) -> DomainResult<MigrationTask> {
        self.repo
            .get(task_id)
            .await?
            .ok_or(DomainError::MigrationNotFound(task_id))
    }

    async fn run(self, task: MigrationTask) {
        let task_id = task.id;
        if let Err(err) = self.execute(task).await {
            error!(task_id = %task_id, error = %err, "Migration loop aborted");
            self.fail_after_abort(task_id, &err).await;
        }
        self.loops
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&task_id);
    }

    /// The execution loop. Batches run strictly one after another.
    async fn execute(&self, mut task: MigrationTask) -> DomainResult<()> {
        let mut cursor: Option<String> = None;
        let mut batch_number: u64 = 0;

        loop {
            // Let pollers and cancel requests in between batches.
            tokio::task::yield_now().await;

            if self.cancel_flagged(task.id).await? {
                task.cancel_requested = true;
                task.transition_to(MigrationStatus::Cancelled)?;
                self.repo.update(&task).await?;
                self.progress.publish(&task);
                info!(
                    task_id = %task.id,
                    completed = task.completed_count,
                    total = task.total_count,
                    "Migration cancelled"
                );
                return Ok(());
            }

            let remaining = task.remaining();
            if remaining == 0 {
                return self.finish(&mut task).await;
            }

            batch_number += 1;
            let limit = self.config.batch_size.min(remaining as usize);
            let outcome = self
                .config
                .retry
                .execute(|attempt| {
                    let task = &task;
                    let cursor = cursor.as_deref();
                    async move {
                        debug!(task_id = %task.id, batch = batch_number, attempt, "Processing batch");
                        self.process_batch(task, cursor, limit).await
                    }
                })
                .await;

            match outcome {
                Ok(batch) if batch.processed == 0 => {
                    if task.completed_count < task.total_count {
                        warn!(
                            task_id = %task.id,
                            completed = task.completed_count,
                            expected = task.total_count,
                            "Vector store exhausted before ledger total; reconciling"
                        );
                        task.reconcile_total();
                    }
                    return self.finish(&mut task).await;
                }
                Ok(batch) => {
                    task.record_progress(batch.processed)?;
                    self.repo.save_progress(task.id, task.completed_count).await?;
                    self.progress.publish(&task);
                    if let Err(exhausted) = self.account_batch(&task, batch.processed).await {
                        let error = match exhausted.error {
                            DomainError::LedgerUnavailable(_) => exhausted.error,
                            other => DomainError::LedgerUnavailable(other.to_string()),
                        };
                        let message = failure_message(exhausted.attempts, error);
                        return self.fail_task(&mut task, batch_number, message).await;
                    }
                    debug!(
                        task_id = %task.id,
                        batch = batch_number,
                        completed = task.completed_count,
                        total = task.total_count,
                        "Batch committed"
                    );
                    cursor = batch.last_item_id;
                }
                Err(exhausted) => {
                    let message = failure_message(exhausted.attempts, exhausted.error);
                    return self.fail_task(&mut task, batch_number, message).await;
                }
            }
        }
    }

    /// Move a committed batch's count in the usage ledger, with the batch retry policy.
    async fn account_batch(
        &self,
        task: &MigrationTask,
        processed: u64,
    ) -> Result<(), RetryExhausted> {
        self.config
            .retry
            .execute(|attempt| async move {
                debug!(task_id = %task.id, attempt, "Updating usage ledger");
                self.ledger
                    .apply_migrated_batch(
                        task.source_model_identity.as_ref(),
                        &task.target_model_identity,
                        processed,
                        task.strategy,
                        Utc::now(),
                    )
                    .await
            })
            .await
    }

    async fn fail_task(
        &self,
        task: &mut MigrationTask,
        batch_number: u64,
        message: String,
    ) -> DomainResult<()> {
        task.fail(message)?;
        self.repo.update(task).await?;
        self.progress.publish(task);
        warn!(
            task_id = %task.id,
            batch = batch_number,
            completed = task.completed_count,
            error = task.error.as_deref().unwrap_or_default(),
            "Migration failed"
        );
        Ok(())
    }

    /// Fetch, embed and durably write one batch.
    async fn process_batch(
        &self,
        task: &MigrationTask,
        after: Option<&str>,
        limit: usize,
    ) -> DomainResult<BatchOutcome> {
        let items = self
            .store
            .fetch_batch(task.source_model_identity.as_ref(), &task.scope, after, limit)
            .await?;
        if items.is_empty() {
            return Ok(BatchOutcome {
                processed: 0,
                last_item_id: after.map(ToString::to_string),
            });
        }

        let inputs: Vec<EmbeddingInput> = items
            .iter()
            .map(|item| EmbeddingInput {
                id: item.item_id.clone(),
                text: item.content.clone(),
            })
            .collect();

        let outputs = tokio::time::timeout(
            self.config.provider_timeout,
            self.provider.embed_batch(&inputs, &task.target_model_identity),
        )
        .await
        .map_err(|_| DomainError::Timeout(self.config.provider_timeout))?
        .map_err(|e| match e {
            DomainError::ProviderFailure { .. } => e,
            other => DomainError::ProviderFailure {
                attempts: 1,
                message: other.to_string(),
            },
        })?;

        let mut by_id: HashMap<String, Vec<f32>> = outputs
            .into_iter()
            .map(|output| (output.id, output.vector))
            .collect();
        let mut vectors = Vec::with_capacity(items.len());
        for item in &items {
            let vector = by_id.remove(&item.item_id).ok_or_else(|| {
                DomainError::ProviderFailure {
                    attempts: 1,
                    message: format!("provider returned no vector for item {}", item.item_id),
                }
            })?;
            vectors.push(EmbeddedItem {
                item_id: item.item_id.clone(),
                vector,
            });
        }

        self.store
            .write(
                &task.target_model_identity,
                task.source_model_identity.as_ref(),
                &vectors,
                task.strategy,
            )
            .await?;

        Ok(BatchOutcome {
            processed: vectors.len() as u64,
            last_item_id: items.last().map(|item| item.item_id.clone()),
        })
    }

    async fn finish(&self, task: &mut MigrationTask) -> DomainResult<()> {
        task.complete()?;
        self.repo.update(task).await?;
        self.progress.publish(task);
        info!(
            task_id = %task.id,
            completed = task.completed_count,
            "Migration completed"
        );
        Ok(())
    }

    async fn cancel_flagged(&self, task_id: Uuid) -> DomainResult<bool> {
        Ok(self
            .repo
            .get(task_id)
            .await?
            .is_some_and(|t| t.cancel_requested))
    }

    /// Best effort: record an aborted loop on the task so it is not left running.
    async fn fail_after_abort(&self, task_id: Uuid, err: &DomainError) {
        let Ok(Some(mut task)) = self.repo.get(task_id).await else {
            return;
        };
        if task.is_terminal() {
            return;
        }
        if task.status == MigrationStatus::Pending || task.fail(err.to_string()).is_err() {
            return;
        }
        match self.repo.update(&task).await {
            Ok(()) => self.progress.publish(&task),
            Err(update_err) => {
                error!(task_id = %task_id, error = %update_err, "Could not record aborted migration");
            }
        }
    }
}

/// The error recorded on a task once every attempt failed.
///
/// Provider errors and provider timeouts are reported as provider failures
/// with the attempt count; anything else keeps its own description.
fn failure_message(attempts: u32, error: DomainError) -> String {
    match error {
        DomainError::ProviderFailure { message, .. } => {
            DomainError::ProviderFailure { attempts, message }.to_string()
        }
        timeout @ DomainError::Timeout(_) => DomainError::ProviderFailure {
            attempts,
            message: timeout.to_string(),
        }
        .to_string(),
        other => format!("{other} (gave up after {attempts} attempt(s))"),
    }
}
