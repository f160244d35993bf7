//! `reembed cancel`: request cancellation of a migration task.

use anyhow::Result;
use clap::Args;

use crate::cli::commands::status::{parse_task_id, TaskDetailOutput};
use crate::cli::context::AppContext;
use crate::cli::output::output;
use crate::domain::models::{Config, MigrationStatus};

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Migration task ID
    pub task_id: String,
}

pub async fn execute(args: CancelArgs, config: Config, json: bool) -> Result<()> {
    let task_id = parse_task_id(&args.task_id)?;
    let ctx = AppContext::open(config).await?;
    let task = ctx.service.cancel(task_id).await?;

    if !json {
        match task.status {
            MigrationStatus::Cancelled => println!("Migration {task_id} cancelled."),
            MigrationStatus::Running => println!(
                "Cancellation requested; migration {task_id} stops after its current batch."
            ),
            // Finished between the request and the flag being observed.
            _ => println!("Migration {task_id} already finished."),
        }
    }
    output(&TaskDetailOutput::from(task), json);
    Ok(())
}
