//! `reembed status`: show a single migration task.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::table::styled_status;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, MigrationScope, MigrationTask};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Migration task ID
    pub task_id: String,
}

/// Full view of one task, used by `status`, `cancel` and `migrate`.
#[derive(Debug, Serialize)]
pub struct TaskDetailOutput {
    #[serde(flatten)]
    pub task: MigrationTask,
    pub progress: f64,
}

impl From<MigrationTask> for TaskDetailOutput {
    fn from(task: MigrationTask) -> Self {
        Self {
            progress: task.progress(),
            task,
        }
    }
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let task = &self.task;
        let source = task
            .source_model_identity
            .as_ref()
            .map_or_else(|| "(untracked)".to_string(), ToString::to_string);
        let scope = match &task.scope {
            MigrationScope::All => "all".to_string(),
            MigrationScope::Subset { selector } => format!("subset ({} ids)", selector.item_ids.len()),
        };

        let mut lines = vec![
            format!("{} {}", style("Migration").bold(), task.id),
            format!("  Status:    {}", styled_status(task.status)),
            format!("  Source:    {source}"),
            format!("  Target:    {}", task.target_model_identity),
            format!("  Strategy:  {}", task.strategy.as_str()),
            format!("  Scope:     {scope}"),
            format!(
                "  Progress:  {}/{} ({:.1}%)",
                task.completed_count,
                task.total_count,
                self.progress * 100.0
            ),
            format!("  Created:   {}", task.created_at.format("%Y-%m-%d %H:%M:%S")),
        ];
        if let Some(started) = task.started_at {
            lines.push(format!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S")));
        }
        if let Some(completed) = task.completed_at {
            lines.push(format!("  Finished:  {}", completed.format("%Y-%m-%d %H:%M:%S")));
        }
        if task.cancel_requested && !task.is_terminal() {
            lines.push(format!("  {}", style("Cancellation requested").yellow()));
        }
        if let Some(error) = &task.error {
            lines.push(format!("  Error:     {}", style(error).red()));
        }
        lines.join("\n")
    }
}

/// Parse a task id argument.
pub(crate) fn parse_task_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid migration task id: {raw}"))
}

pub async fn execute(args: StatusArgs, config: Config, json: bool) -> Result<()> {
    let task_id = parse_task_id(&args.task_id)?;
    let ctx = AppContext::open(config).await?;
    let task = ctx.service.get_status(task_id).await?;
    output(&TaskDetailOutput::from(task), json);
    Ok(())
}
