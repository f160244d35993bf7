//! `reembed import`: load items from a JSON Lines file.
//!
//! Each line is `{"item_id": "...", "content": "...", "vector": [..]}`;
//! `vector` is optional. Items are stored under `--model`/`--provider`
//! and the ledger is credited with the number of imported items.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::cli::context::AppContext;
use crate::cli::output::{create_spinner, output, CommandOutput, ProgressBarExt};
use crate::domain::models::{Config, EmbeddingModelIdentity};
use crate::domain::ports::{StoredItem, UsageLedger};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON Lines file to import
    pub file: PathBuf,

    /// Model that produced the vectors
    #[arg(long)]
    pub model: String,

    /// Provider of --model
    #[arg(long)]
    pub provider: String,

    /// Items written per transaction
    #[arg(long, default_value = "500")]
    pub chunk_size: usize,
}

#[derive(Debug, Deserialize)]
struct ImportLine {
    item_id: String,
    content: String,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub imported: u64,
    pub model: EmbeddingModelIdentity,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        format!("Imported {} items embedded by {}", self.imported, self.model)
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<Option<(StoredItem, Option<Vec<f32>>)>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed: ImportLine = serde_json::from_str(trimmed)
        .with_context(|| format!("Line {line_no}: invalid import record"))?;
    if parsed.item_id.trim().is_empty() {
        bail!("Line {line_no}: item_id cannot be empty");
    }
    Ok(Some((
        StoredItem {
            item_id: parsed.item_id,
            content: parsed.content,
        },
        parsed.vector,
    )))
}

pub async fn execute(args: ImportArgs, config: Config, json: bool) -> Result<()> {
    let model = EmbeddingModelIdentity::new(args.model, args.provider);
    model
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid model: {e}"))?;
    let chunk_size = args.chunk_size.max(1);

    let file = File::open(&args.file)
        .await
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let ctx = AppContext::open(config).await?;

    let spinner = create_spinner(format!("Importing {}", args.file.display()));
    if json {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let mut lines = BufReader::new(file).lines();
    let mut chunk = Vec::with_capacity(chunk_size);
    let mut imported: u64 = 0;
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if let Some(item) = parse_line(&line, line_no)? {
            chunk.push(item);
        }
        if chunk.len() >= chunk_size {
            imported += flush(&ctx, &model, &mut chunk).await?;
            spinner.set_message(format!("Imported {imported} items"));
        }
    }
    imported += flush(&ctx, &model, &mut chunk).await?;
    spinner.finish_success(format!("Imported {imported} items"));

    info!(imported, model = %model, "Import finished");
    output(&ImportOutput { imported, model }, json);
    Ok(())
}

async fn flush(
    ctx: &AppContext,
    model: &EmbeddingModelIdentity,
    chunk: &mut Vec<(StoredItem, Option<Vec<f32>>)>,
) -> Result<u64> {
    if chunk.is_empty() {
        return Ok(0);
    }
    ctx.store.upsert_items(Some(model), chunk).await?;
    let count = chunk.len() as u64;
    ctx.ledger.record_usage(model, count, Utc::now()).await?;
    chunk.clear();
    Ok(count)
}
