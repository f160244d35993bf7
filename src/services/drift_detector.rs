//! Drift detection between the configured embedding model and the usage ledger.
//!
//! [`evaluate`] is a pure function of the current model and the ledger
//! records; [`DriftDetector`] wires it to the ledger and configuration
//! ports and absorbs ledger failures into a degraded recommendation.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EmbeddingModelIdentity, MigrationRecommendation, MissingPeriod, RecommendationReason,
    UsageRecord,
};
use crate::domain::ports::{ModelConfigService, UsageLedger};

/// Reads the ledger and current configuration to produce recommendations.
pub struct DriftDetector {
    ledger: Arc<dyn UsageLedger>,
    model_config: Arc<dyn ModelConfigService>,
    gap_granularity: Duration,
}

impl DriftDetector {
    pub fn new(ledger: Arc<dyn UsageLedger>, model_config: Arc<dyn ModelConfigService>) -> Self {
        Self {
            ledger,
            model_config,
            gap_granularity: Duration::days(1),
        }
    }

    /// Coverage gaps no longer than this are not reported.
    pub fn with_gap_granularity(mut self, granularity: Duration) -> Self {
        self.gap_granularity = granularity;
        self
    }

    /// Recommendation for the currently configured model.
    pub async fn recommend(&self) -> DomainResult<MigrationRecommendation> {
        let current = self.model_config.current_model().await?;
        Ok(self.recommend_for(&current).await)
    }

    /// Recommendation for an explicit model. Never fails: an unreadable
    /// ledger yields a degraded recommendation with `error` set.
    pub async fn recommend_for(&self, current: &EmbeddingModelIdentity) -> MigrationRecommendation {
        match self.ledger.list_records().await {
            Ok(records) => evaluate(current, &records, self.gap_granularity),
            Err(err) => {
                let err = match err {
                    DomainError::LedgerUnavailable(_) => err,
                    other => DomainError::LedgerUnavailable(other.to_string()),
                };
                warn!(model = %current, error = %err, "Returning degraded recommendation");
                MigrationRecommendation::unavailable(current.clone(), err.to_string())
            }
        }
    }
}

/// Evaluate `current` against the ledger.
pub fn evaluate(
    current: &EmbeddingModelIdentity,
    ledger: &[UsageRecord],
    gap_granularity: Duration,
) -> MigrationRecommendation {
    let current_record = ledger.iter().find(|r| &r.identity == current);
    // A ledger row with zero embeddings still counts as tracked.
    let new_model_untracked = current_record.is_none();
    let new_model = current_record
        .cloned()
        .unwrap_or_else(|| UsageRecord::unused(current.clone()));

    let mut historical_models: Vec<UsageRecord> = ledger
        .iter()
        .filter(|r| &r.identity != current)
        .cloned()
        .collect();
    historical_models.sort_by(by_last_used_desc);

    let reason = if historical_models.iter().any(|r| r.embedding_count > 0) {
        RecommendationReason::ModelChanged
    } else if !historical_models.is_empty() && new_model_untracked {
        RecommendationReason::NewModelUncovered
    } else if historical_models.is_empty() && new_model.embedding_count == 0 {
        RecommendationReason::NothingEmbedded
    } else {
        RecommendationReason::UpToDate
    };
    let needs_migration = matches!(
        reason,
        RecommendationReason::ModelChanged | RecommendationReason::NewModelUncovered
    );

    let previous_model = historical_models.first().cloned();
    let missing_periods = find_missing_periods(current, ledger, gap_granularity);
    let recommendation_text =
        recommendation_text(reason, previous_model.as_ref(), &new_model, &missing_periods);

    debug!(
        model = %current,
        reason = reason.as_str(),
        historical = historical_models.len(),
        missing_periods = missing_periods.len(),
        "Evaluated embedding drift"
    );

    MigrationRecommendation {
        needs_migration,
        reason,
        previous_model,
        new_model,
        historical_models,
        missing_periods,
        recommendation_text,
        error: None,
    }
}

/// Most recently used first; ties broken by identity so the order is stable.
fn by_last_used_desc(a: &UsageRecord, b: &UsageRecord) -> Ordering {
    match (a.last_used_at, b.last_used_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.identity.cmp(&b.identity))
}

/// Walk every usage interval in start order and report the stretches no
/// model covers, attributed to the non-current model active just before.
///
/// Interval endpoints come from aggregate stats, so this only sees gaps
/// longer than `granularity` between whole-model usage spans.
fn find_missing_periods(
    current: &EmbeddingModelIdentity,
    ledger: &[UsageRecord],
    granularity: Duration,
) -> Vec<MissingPeriod> {
    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>, &UsageRecord)> = ledger
        .iter()
        .filter_map(|r| r.interval().map(|(start, end)| (start, end, r)))
        .collect();
    if !intervals.iter().any(|(_, _, r)| &r.identity != current) {
        return Vec::new();
    }
    intervals.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.2.identity.cmp(&b.2.identity)));

    let mut periods = Vec::new();
    let mut iter = intervals.into_iter();
    let Some((_, mut covered_until, mut active)) = iter.next() else {
        return periods;
    };

    for (start, end, record) in iter {
        if start > covered_until
            && start - covered_until > granularity
            && &active.identity != current
        {
            periods.push(MissingPeriod {
                from: covered_until,
                to: start,
                model_identity_at_time: active.identity.clone(),
                count: active.embedding_count,
            });
        }
        if end >= covered_until {
            covered_until = end;
            active = record;
        }
    }

    periods
}

fn recommendation_text(
    reason: RecommendationReason,
    previous: Option<&UsageRecord>,
    new_model: &UsageRecord,
    missing_periods: &[MissingPeriod],
) -> String {
    let mut text = match (reason, previous) {
        (RecommendationReason::ModelChanged, Some(prev)) => format!(
            "Existing embeddings were generated with {} ({} embeddings). The current model {} has {} existing embeddings. Re-embed historical data so semantic search compares vectors from the same model.",
            prev.identity, prev.embedding_count, new_model.identity, new_model.embedding_count
        ),
        (RecommendationReason::NewModelUncovered, Some(prev)) => format!(
            "The current model {} has no embeddings yet; {} was used previously. Generate embeddings for historical data with the current model.",
            new_model.identity, prev.identity
        ),
        (RecommendationReason::NothingEmbedded, _) => format!(
            "No embeddings have been generated yet. New content will be embedded with {}; run a backfill to embed existing data.",
            new_model.identity
        ),
        (RecommendationReason::Unknown, _) => {
            "Embedding usage data is unavailable; migration status is unknown.".to_string()
        }
        _ => format!(
            "All {} embeddings were generated with the current model {}. No migration needed.",
            new_model.embedding_count, new_model.identity
        ),
    };

    if !missing_periods.is_empty() {
        let days: i64 = missing_periods.iter().map(|p| p.duration().num_days()).sum();
        text.push_str(&format!(
            " Coverage could not be confirmed for {} period(s) spanning about {} day(s).",
            missing_periods.len(),
            days
        ));
    }

    text
}
