//! `reembed list`: migration history.

use anyhow::{anyhow, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::commands::status::TaskDetailOutput;
use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, render_list, status_cell, CommandOutput};
use crate::domain::models::{Config, MigrationStatus, MigrationTask};
use crate::domain::ports::MigrationFilter;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status (pending, running, completed, failed, cancelled)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Include archived tasks
    #[arg(short, long)]
    pub all: bool,

    /// Maximum number of tasks to display
    #[arg(short, long, default_value = "20")]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskDetailOutput>,
    pub total: usize,
}

impl From<Vec<MigrationTask>> for TaskListOutput {
    fn from(tasks: Vec<MigrationTask>) -> Self {
        let total = tasks.len();
        Self {
            tasks: tasks.into_iter().map(TaskDetailOutput::from).collect(),
            total,
        }
    }
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "status", "source", "target", "strategy", "progress", "created"]);
        for detail in &self.tasks {
            let task = &detail.task;
            let source = task
                .source_model_identity
                .as_ref()
                .map_or_else(|| "(untracked)".to_string(), ToString::to_string);
            table.add_row(vec![
                Cell::new(&task.id.to_string()[..8]),
                status_cell(task.status),
                Cell::new(source),
                Cell::new(task.target_model_identity.to_string()),
                Cell::new(task.strategy.as_str()),
                Cell::new(format!("{}/{}", task.completed_count, task.total_count)),
                Cell::new(task.created_at.format("%Y-%m-%d %H:%M")),
            ]);
        }
        render_list("migration", table, self.total)
    }
}

pub async fn execute(args: ListArgs, config: Config, json: bool) -> Result<()> {
    let status = args
        .status
        .as_deref()
        .map(|s| MigrationStatus::from_str(s).ok_or_else(|| anyhow!("Unknown status: {s}")))
        .transpose()?;

    let ctx = AppContext::open(config).await?;
    let tasks = ctx
        .service
        .list(MigrationFilter {
            status,
            include_archived: args.all,
            limit: Some(args.limit.max(1)),
        })
        .await?;

    output(&TaskListOutput::from(tasks), json);
    Ok(())
}
