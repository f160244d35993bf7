//! Drift recommendation models.
//!
//! Everything in here is derived from the current configuration and the
//! usage ledger on every read. None of it is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EmbeddingModelIdentity, UsageRecord};

/// A time window whose embedding-model coverage cannot be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Model most recently active before the window opened.
    pub model_identity_at_time: EmbeddingModelIdentity,
    /// Embeddings attributed to `model_identity_at_time`.
    pub count: u64,
}

impl MissingPeriod {
    pub fn duration(&self) -> chrono::Duration {
        self.to - self.from
    }
}

/// Why a recommendation was (or was not) raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    /// Only the current model has ever been used.
    UpToDate,
    /// Older models still own embeddings.
    ModelChanged,
    /// Older models exist (possibly already drained) and the current model has no coverage.
    NewModelUncovered,
    /// No model has ever produced a vector; an initial backfill may be wanted,
    /// but nothing has drifted.
    NothingEmbedded,
    /// The ledger could not be read.
    Unknown,
}

impl RecommendationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpToDate => "up_to_date",
            Self::ModelChanged => "model_changed",
            Self::NewModelUncovered => "new_model_uncovered",
            Self::NothingEmbedded => "nothing_embedded",
            Self::Unknown => "unknown",
        }
    }
}

/// Outcome of evaluating the current model against the usage ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecommendation {
    pub needs_migration: bool,
    pub reason: RecommendationReason,
    pub previous_model: Option<UsageRecord>,
    pub new_model: UsageRecord,
    /// Non-current records, most recently used first.
    pub historical_models: Vec<UsageRecord>,
    pub missing_periods: Vec<MissingPeriod>,
    pub recommendation_text: String,
    /// Set when the ledger was unreadable. Callers must not prompt a migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationRecommendation {
    /// Degraded recommendation returned when the ledger cannot be read.
    pub fn unavailable(current: EmbeddingModelIdentity, error: impl Into<String>) -> Self {
        Self {
            needs_migration: false,
            reason: RecommendationReason::Unknown,
            previous_model: None,
            new_model: UsageRecord::unused(current),
            historical_models: Vec::new(),
            missing_periods: Vec::new(),
            recommendation_text:
                "Embedding usage data is unavailable; migration status is unknown.".to_string(),
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}
