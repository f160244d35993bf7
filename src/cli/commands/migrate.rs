//! `reembed migrate`: run a migration in this process with a progress bar.
//!
//! Without explicit flags the source is the most recently used non-current
//! model from the ledger and the target is the configured model. Ctrl-C
//! requests cancellation; the command returns once the current batch
//! commits and the task reaches a terminal state.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Args;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::cli::commands::identity_from_flags;
use crate::cli::commands::status::TaskDetailOutput;
use crate::cli::context::AppContext;
use crate::cli::output::{create_progress_bar, output, ProgressBarExt};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Config, EmbeddingModelIdentity, MigrationRequest, MigrationStatus, MigrationStrategy,
    MigrationTask, ScopeKind, SubsetSelector,
};

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Model whose vectors are re-embedded (defaults to the previous model)
    #[arg(long)]
    pub source_model: Option<String>,

    /// Provider of --source-model
    #[arg(long)]
    pub source_provider: Option<String>,

    /// Model to re-embed with (defaults to the configured model)
    #[arg(long)]
    pub target_model: Option<String>,

    /// Provider of --target-model
    #[arg(long)]
    pub target_provider: Option<String>,

    /// How new vectors are written: replace or append
    #[arg(short, long, default_value = "replace")]
    pub strategy: String,

    /// Only migrate these item ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub items: Vec<String>,
}

impl MigrateArgs {
    fn strategy(&self) -> Result<MigrationStrategy> {
        MigrationStrategy::from_str(&self.strategy)
            .ok_or_else(|| anyhow!("Unknown strategy '{}': expected replace or append", self.strategy))
    }

    fn scope(&self) -> (ScopeKind, Option<SubsetSelector>) {
        if self.items.is_empty() {
            (ScopeKind::All, None)
        } else {
            (
                ScopeKind::Subset,
                Some(SubsetSelector {
                    item_ids: self.items.clone(),
                }),
            )
        }
    }
}

/// Resolve the source model: explicit flags, or the ledger's previous model.
async fn resolve_source(
    ctx: &AppContext,
    explicit: Option<EmbeddingModelIdentity>,
    target: &EmbeddingModelIdentity,
) -> Result<EmbeddingModelIdentity> {
    if let Some(explicit) = explicit {
        return Ok(explicit);
    }
    let recommendation = ctx.service.get_recommendation(Some(target.clone())).await?;
    if let Some(error) = recommendation.error {
        bail!("Cannot determine the source model: {error}");
    }
    match recommendation.previous_model {
        Some(previous) => Ok(previous.identity),
        None => bail!(
            "No previous model in the usage ledger; pass --source-model and --source-provider"
        ),
    }
}

pub async fn execute(args: MigrateArgs, config: Config, json: bool) -> Result<()> {
    let strategy = args.strategy()?;
    let (scope, subset) = args.scope();
    let explicit_source = identity_from_flags(
        args.source_model.clone(),
        args.source_provider.clone(),
        ("--source-model", "--source-provider"),
    )?;
    let explicit_target = identity_from_flags(
        args.target_model.clone(),
        args.target_provider.clone(),
        ("--target-model", "--target-provider"),
    )?;

    let poll_interval = Duration::from_secs(config.migration.poll_interval_secs.max(1));
    let ctx = AppContext::open(config).await?;
    let target = explicit_target.unwrap_or_else(|| ctx.config.embedding.current_model());
    let source = resolve_source(&ctx, explicit_source, &target).await?;

    let task = ctx
        .service
        .start_migration(MigrationRequest {
            source: Some(source),
            target,
            strategy,
            scope,
            subset,
        })
        .await?;
    info!(task_id = %task.id, total = task.total_count, "Migration started");

    let finished = follow(&ctx, &task, poll_interval, json).await?;
    output(&TaskDetailOutput::from(finished.clone()), json);

    match finished.status {
        MigrationStatus::Failed => Err(anyhow!(
            "Migration {} failed: {}",
            finished.id,
            finished.error.as_deref().unwrap_or("unknown error")
        )),
        _ => Ok(()),
    }
}

/// Drive the progress bar until the task is terminal. Ctrl-C cancels once.
async fn follow(
    ctx: &AppContext,
    task: &MigrationTask,
    poll_interval: Duration,
    json: bool,
) -> Result<MigrationTask> {
    let pb = create_progress_bar(task.total_count, json);
    let source = task
        .source_model_identity
        .as_ref()
        .map_or_else(|| "(untracked)".to_string(), ToString::to_string);
    pb.set_message(format!("{source} -> {}", task.target_model_identity));

    let mut updates: watch::Receiver<MigrationTask> = ctx.service.subscribe(task.id).await?;
    let mut ticker = tokio::time::interval(poll_interval);
    let mut cancel_sent = false;
    let mut snapshot = task.clone();

    loop {
        pb.set_length(snapshot.total_count);
        pb.set_position(snapshot.completed_count);
        if snapshot.is_terminal() {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                snapshot = if changed.is_ok() {
                    updates.borrow_and_update().clone()
                } else {
                    // Channel closes after the terminal snapshot; fall back to polling.
                    refresh(ctx, task.id).await?
                };
            }
            _ = ticker.tick() => {
                let polled = refresh(ctx, task.id).await?;
                if polled.completed_count >= snapshot.completed_count || polled.is_terminal() {
                    snapshot = polled;
                }
            }
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                if signal.is_ok() {
                    cancel_sent = true;
                    pb.set_message("cancelling after the current batch...");
                    snapshot = match cancel_outcome(ctx.service.cancel(task.id).await)? {
                        Some(cancelled) => cancelled,
                        None => refresh(ctx, task.id).await?,
                    };
                }
            }
        }
    }

    match snapshot.status {
        MigrationStatus::Completed => pb.finish_success(format!(
            "{} items re-embedded with {}",
            snapshot.completed_count, snapshot.target_model_identity
        )),
        MigrationStatus::Cancelled => pb.finish_warning(format!(
            "cancelled after {}/{} items",
            snapshot.completed_count, snapshot.total_count
        )),
        _ => pb.finish_error(snapshot.error.clone().unwrap_or_else(|| "failed".to_string())),
    }
    Ok(snapshot)
}

async fn refresh(ctx: &AppContext, task_id: Uuid) -> Result<MigrationTask> {
    Ok(ctx.service.get_status(task_id).await?)
}

/// `None` when the task reached a terminal state before the cancel landed.
fn cancel_outcome(result: DomainResult<MigrationTask>) -> Result<Option<MigrationTask>> {
    match result {
        Ok(task) => Ok(Some(task)),
        Err(DomainError::InvalidTransition { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
