//! `reembed record-usage`: add externally produced vectors to the ledger.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, EmbeddingModelIdentity, UsageRecord};
use crate::domain::ports::UsageLedger;

#[derive(Args, Debug)]
pub struct RecordUsageArgs {
    /// Model that produced the vectors
    #[arg(long)]
    pub model: String,

    /// Provider that served the model
    #[arg(long)]
    pub provider: String,

    /// Number of vectors produced
    #[arg(long)]
    pub count: u64,

    /// When the vectors were produced (RFC 3339, defaults to now)
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordUsageOutput {
    pub recorded: u64,
    pub record: UsageRecord,
}

impl CommandOutput for RecordUsageOutput {
    fn to_human(&self) -> String {
        format!(
            "Recorded {} embeddings for {} (total {})",
            self.recorded, self.record.identity, self.record.embedding_count
        )
    }
}

fn parse_timestamp(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid timestamp '{raw}', expected RFC 3339"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

pub async fn execute(args: RecordUsageArgs, config: Config, json: bool) -> Result<()> {
    let identity = EmbeddingModelIdentity::new(args.model, args.provider);
    identity
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid model: {e}"))?;
    let at = parse_timestamp(args.at.as_deref())?;

    let ctx = AppContext::open(config).await?;
    ctx.ledger.record_usage(&identity, args.count, at).await?;
    let record = ctx
        .ledger
        .get_record(&identity)
        .await?
        .unwrap_or_else(|| UsageRecord::unused(identity.clone()));

    output(
        &RecordUsageOutput {
            recorded: args.count,
            record,
        },
        json,
    );
    Ok(())
}
