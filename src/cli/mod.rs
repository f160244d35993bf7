//! Command-line interface.
//!
//! `reembed serve` runs the HTTP API; the remaining commands operate on the
//! same database directly. All commands accept `--json` for machine-readable
//! output and `--config` to point at an explicit configuration file.

pub mod commands;
pub mod context;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;

use crate::domain::errors::DomainError;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::LoggerImpl;

use commands::{
    cancel::CancelArgs, import::ImportArgs, list::ListArgs, migrate::MigrateArgs,
    recommend::RecommendArgs, record_usage::RecordUsageArgs, serve::ServeArgs,
    status::StatusArgs,
};

pub use context::AppContext;

#[derive(Parser, Debug)]
#[command(name = "reembed")]
#[command(about = "Detect embedding model drift and re-embed stored content", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (replaces .reembed/config.yaml and local.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Show whether stored embeddings need migrating
    Recommend(RecommendArgs),
    /// Re-embed stored items with a target model
    Migrate(MigrateArgs),
    /// Show a migration task
    Status(StatusArgs),
    /// Cancel a migration task
    Cancel(CancelArgs),
    /// List migration tasks
    List(ListArgs),
    /// Record vectors produced outside this tool in the usage ledger
    RecordUsage(RecordUsageArgs),
    /// Load items from a JSON Lines file into the vector store
    Import(ImportArgs),
}

/// Load configuration for `cli`.
pub fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_with_file(path),
        None => ConfigLoader::load(),
    }
}

/// Load configuration, install logging and run the selected command.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let _logger = LoggerImpl::init(&config.logging)?;
    let json = cli.json;

    match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, config).await,
        Commands::Recommend(args) => commands::recommend::execute(args, config, json).await,
        Commands::Migrate(args) => commands::migrate::execute(args, config, json).await,
        Commands::Status(args) => commands::status::execute(args, config, json).await,
        Commands::Cancel(args) => commands::cancel::execute(args, config, json).await,
        Commands::List(args) => commands::list::execute(args, config, json).await,
        Commands::RecordUsage(args) => commands::record_usage::execute(args, config, json).await,
        Commands::Import(args) => commands::import::execute(args, config, json).await,
    }
}

/// Print `err` and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    let code = err
        .downcast_ref::<DomainError>()
        .map_or("error", DomainError::code);

    if json {
        let body = serde_json::json!({
            "error": format!("{err:#}"),
            "code": code,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("{} {err:#}", style("Error:").red().bold());
    }
    std::process::exit(1);
}
