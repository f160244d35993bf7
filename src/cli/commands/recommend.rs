//! `reembed recommend`: drift report for the configured (or a given) model.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use console::style;
use serde::Serialize;

use crate::cli::commands::identity_from_flags;
use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::{Config, MigrationRecommendation, UsageRecord};

#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// Evaluate this model instead of the configured one
    #[arg(long)]
    pub model: Option<String>,

    /// Provider of --model
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct RecommendationOutput(pub MigrationRecommendation);

fn usage_row(record: &UsageRecord) -> Vec<Cell> {
    let fmt = |at: Option<chrono::DateTime<chrono::Utc>>| {
        at.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
    };
    vec![
        Cell::new(record.identity.to_string()),
        Cell::new(record.embedding_count),
        Cell::new(fmt(record.first_used_at)),
        Cell::new(fmt(record.last_used_at)),
    ]
}

impl CommandOutput for RecommendationOutput {
    fn to_human(&self) -> String {
        let rec = &self.0;
        let mut lines = Vec::new();

        lines.push(format!(
            "Current model: {} ({} embeddings)",
            style(&rec.new_model.identity).bold(),
            rec.new_model.embedding_count
        ));

        let verdict = if let Some(error) = &rec.error {
            style(format!("UNKNOWN ({error})")).yellow().to_string()
        } else if rec.needs_migration {
            style("MIGRATION RECOMMENDED").red().bold().to_string()
        } else {
            style("up to date").green().to_string()
        };
        lines.push(format!("Status: {verdict} [{}]", rec.reason.as_str()));
        lines.push(String::new());
        lines.push(rec.recommendation_text.clone());

        if !rec.historical_models.is_empty() {
            let mut table = list_table(&["model", "embeddings", "first used", "last used"]);
            for record in &rec.historical_models {
                table.add_row(usage_row(record));
            }
            lines.push(String::new());
            lines.push(format!("{}", style("Historical models:").bold()));
            lines.push(table.to_string());
        }

        if !rec.missing_periods.is_empty() {
            let mut table = list_table(&["from", "to", "model at time", "embeddings"]);
            for period in &rec.missing_periods {
                table.add_row(vec![
                    Cell::new(period.from.format("%Y-%m-%d %H:%M")),
                    Cell::new(period.to.format("%Y-%m-%d %H:%M")),
                    Cell::new(period.model_identity_at_time.to_string()),
                    Cell::new(period.count),
                ]);
            }
            lines.push(String::new());
            lines.push(format!("{}", style("Unconfirmed coverage:").bold()));
            lines.push(table.to_string());
        }

        lines.join("\n")
    }
}

pub async fn execute(args: RecommendArgs, config: Config, json: bool) -> Result<()> {
    let model = identity_from_flags(args.model, args.provider, ("--model", "--provider"))?;
    let ctx = AppContext::open(config).await?;
    let recommendation = ctx.service.get_recommendation(model).await?;
    output(&RecommendationOutput(recommendation), json);
    Ok(())
}
