//! Usage ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EmbeddingModelIdentity;

/// Aggregated usage of one embedding model across every stored vector.
///
/// `first_used_at`/`last_used_at` are `None` only for a synthesized record
/// describing a model that has never produced a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub identity: EmbeddingModelIdentity,
    pub embedding_count: u64,
    pub first_used_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    pub fn new(
        identity: EmbeddingModelIdentity,
        embedding_count: u64,
        first_used_at: DateTime<Utc>,
        last_used_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            embedding_count,
            first_used_at: Some(first_used_at),
            last_used_at: Some(last_used_at),
        }
    }

    /// A record for a model with no ledger entry.
    pub fn unused(identity: EmbeddingModelIdentity) -> Self {
        Self {
            identity,
            embedding_count: 0,
            first_used_at: None,
            last_used_at: None,
        }
    }

    /// The `[first_used_at, last_used_at]` interval, when known.
    pub fn interval(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.first_used_at, self.last_used_at) {
            (Some(first), Some(last)) if first <= last => Some((first, last)),
            (Some(first), Some(last)) => Some((last, first)),
            _ => None,
        }
    }
}
