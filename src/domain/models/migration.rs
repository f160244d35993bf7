//! Migration task domain model.
//!
//! A migration task is one re-embedding run from a source model to a
//! target model. It is the only persisted entity this crate owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EmbeddingModelIdentity;
use crate::domain::errors::{DomainError, DomainResult};

/// Status of a migration task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Created, not started
    Pending,
    /// Execution loop is re-embedding
    Running,
    /// Every item was re-embedded
    Completed,
    /// Gave up after an unrecoverable error
    Failed,
    /// Stopped on user request
    Cancelled,
}

impl Default for MigrationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active (non-terminal) state.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [MigrationStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How re-embedded vectors are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Overwrite the old vector in place.
    Replace,
    /// Keep the old vector and add a new one, so both models stay queryable.
    Append,
}

impl Default for MigrationStrategy {
    fn default() -> Self {
        Self::Replace
    }
}

impl MigrationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "append" => Some(Self::Append),
            _ => None,
        }
    }
}

/// Requested breadth of a migration, as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    All,
    Subset,
}

impl Default for ScopeKind {
    fn default() -> Self {
        Self::All
    }
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Subset => "subset",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(Self::All),
            "subset" => Some(Self::Subset),
            _ => None,
        }
    }
}

/// Selects the stored items a subset migration covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetSelector {
    pub item_ids: Vec<String>,
}

impl SubsetSelector {
    pub fn is_empty(&self) -> bool {
        self.item_ids.iter().all(|id| id.trim().is_empty())
    }
}

/// Resolved scope stored on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationScope {
    All,
    Subset { selector: SubsetSelector },
}

impl Default for MigrationScope {
    fn default() -> Self {
        Self::All
    }
}

impl MigrationScope {
    /// Resolve a requested scope, rejecting a subset without a usable selector.
    pub fn resolve(kind: ScopeKind, selector: Option<SubsetSelector>) -> DomainResult<Self> {
        match (kind, selector) {
            (ScopeKind::All, _) => Ok(Self::All),
            (ScopeKind::Subset, Some(selector)) if !selector.is_empty() => {
                Ok(Self::Subset { selector })
            }
            (ScopeKind::Subset, _) => Err(DomainError::InvalidScope(
                "subset scope requires a non-empty subset selector".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::All => ScopeKind::All,
            Self::Subset { .. } => ScopeKind::Subset,
        }
    }
}

/// Caller input for creating a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// `None` re-embeds items with no tracked source model.
    #[serde(default)]
    pub source: Option<EmbeddingModelIdentity>,
    pub target: EmbeddingModelIdentity,
    #[serde(default)]
    pub strategy: MigrationStrategy,
    #[serde(default)]
    pub scope: ScopeKind,
    #[serde(default)]
    pub subset: Option<SubsetSelector>,
}

/// One re-embedding run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTask {
    pub id: Uuid,
    pub source_model_identity: Option<EmbeddingModelIdentity>,
    pub target_model_identity: EmbeddingModelIdentity,
    pub strategy: MigrationStrategy,
    pub scope: MigrationScope,
    pub status: MigrationStatus,
    pub total_count: u64,
    pub completed_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Set by a cancel request; honored by the execution loop between batches.
    pub cancel_requested: bool,
    /// Set when a terminal task is moved out of default listings.
    pub archived_at: Option<DateTime<Utc>>,
}

impl MigrationTask {
    pub fn new(
        source: Option<EmbeddingModelIdentity>,
        target: EmbeddingModelIdentity,
        strategy: MigrationStrategy,
        scope: MigrationScope,
        total_count: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_model_identity: source,
            target_model_identity: target,
            strategy,
            scope,
            status: MigrationStatus::Pending,
            total_count,
            completed_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error: None,
            cancel_requested: false,
            archived_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn remaining(&self) -> u64 {
        self.total_count.saturating_sub(self.completed_count)
    }

    /// Completion ratio in `[0.0, 1.0]`. A task with nothing to do counts as done.
    pub fn progress(&self) -> f64 {
        if self.total_count == 0 {
            return if self.is_terminal() { 1.0 } else { 0.0 };
        }
        self.completed_count as f64 / self.total_count as f64
    }

    /// Transition to a new status, stamping lifecycle timestamps.
    ///
    /// Invalid transitions leave the task untouched.
    pub fn transition_to(&mut self, new_status: MigrationStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        self.status = new_status;
        self.updated_at = now;

        match new_status {
            MigrationStatus::Running => self.started_at = Some(now),
            MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::Cancelled => {
                self.completed_at = Some(now);
            }
            MigrationStatus::Pending => {}
        }

        Ok(())
    }

    /// Record a committed batch. Never exceeds `total_count`.
    pub fn record_progress(&mut self, items: u64) -> DomainResult<()> {
        if self.status != MigrationStatus::Running {
            return Err(DomainError::ValidationFailed(format!(
                "cannot record progress on a {} task",
                self.status
            )));
        }
        let next = self.completed_count.saturating_add(items);
        if next > self.total_count {
            return Err(DomainError::ValidationFailed(format!(
                "progress {next} would exceed total {}",
                self.total_count
            )));
        }
        self.completed_count = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the task failed with a human-readable cause.
    pub fn fail(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.transition_to(MigrationStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Mark the task completed. Requires every counted item to be done.
    pub fn complete(&mut self) -> DomainResult<()> {
        if self.completed_count != self.total_count {
            return Err(DomainError::ValidationFailed(format!(
                "cannot complete with {}/{} items done",
                self.completed_count, self.total_count
            )));
        }
        self.transition_to(MigrationStatus::Completed)
    }

    /// Lower the total to what was actually found in the store.
    pub fn reconcile_total(&mut self) {
        self.total_count = self.completed_count;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(total: u64) -> MigrationTask {
        MigrationTask::new(
            Some(EmbeddingModelIdentity::new("text-embedding-3-small", "openai")),
            EmbeddingModelIdentity::new("text-embedding-3-large", "openai"),
            MigrationStrategy::Replace,
            MigrationScope::All,
            total,
        )
    }

    #[test]
    fn test_new_task_is_pending() {
        let t = task(500);
        assert_eq!(t.status, MigrationStatus::Pending);
        assert!(t.started_at.is_none());
        assert_eq!(t.completed_count, 0);
        assert_eq!(t.remaining(), 500);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut t = task(10);
        t.transition_to(MigrationStatus::Running).unwrap();
        assert!(t.started_at.is_some());
        t.record_progress(10).unwrap();
        t.complete().unwrap();
        assert!(t.completed_at.is_some());
        assert!(t.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            MigrationStatus::Completed,
            MigrationStatus::Failed,
            MigrationStatus::Cancelled,
        ] {
            assert!(terminal.valid_transitions().is_empty());
            for next in [
                MigrationStatus::Pending,
                MigrationStatus::Running,
                MigrationStatus::Completed,
                MigrationStatus::Failed,
                MigrationStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_invalid_transition_does_not_mutate() {
        let mut t = task(10);
        t.transition_to(MigrationStatus::Running).unwrap();
        let before = t.clone();
        let err = t.transition_to(MigrationStatus::Running).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(t, before);
    }

    #[test]
    fn test_pending_cannot_complete_or_fail() {
        let mut t = task(0);
        assert!(t.transition_to(MigrationStatus::Completed).is_err());
        assert!(t.fail("boom").is_err());
        assert_eq!(t.status, MigrationStatus::Pending);
        assert!(t.error.is_none());
    }

    #[test]
    fn test_progress_cannot_exceed_total() {
        let mut t = task(5);
        t.transition_to(MigrationStatus::Running).unwrap();
        t.record_progress(3).unwrap();
        assert!(t.record_progress(3).is_err());
        assert_eq!(t.completed_count, 3);
    }

    #[test]
    fn test_complete_requires_full_progress() {
        let mut t = task(5);
        t.transition_to(MigrationStatus::Running).unwrap();
        t.record_progress(4).unwrap();
        assert!(t.complete().is_err());
        t.reconcile_total();
        t.complete().unwrap();
        assert_eq!(t.total_count, 4);
    }

    #[test]
    fn test_fail_keeps_partial_progress() {
        let mut t = task(500);
        t.transition_to(MigrationStatus::Running).unwrap();
        t.record_progress(200).unwrap();
        t.fail("provider down").unwrap();
        assert_eq!(t.completed_count, 200);
        assert_eq!(t.error.as_deref(), Some("provider down"));
    }

    #[test]
    fn test_subset_scope_requires_selector() {
        assert!(matches!(
            MigrationScope::resolve(ScopeKind::Subset, None),
            Err(DomainError::InvalidScope(_))
        ));
        assert!(matches!(
            MigrationScope::resolve(
                ScopeKind::Subset,
                Some(SubsetSelector { item_ids: vec![" ".to_string()] })
            ),
            Err(DomainError::InvalidScope(_))
        ));
        let scope = MigrationScope::resolve(
            ScopeKind::Subset,
            Some(SubsetSelector { item_ids: vec!["doc-1".to_string()] }),
        )
        .unwrap();
        assert_eq!(scope.kind(), ScopeKind::Subset);
        assert_eq!(
            MigrationScope::resolve(ScopeKind::All, None).unwrap(),
            MigrationScope::All
        );
    }

    #[test]
    fn test_status_round_trip_strings() {
        assert_eq!(MigrationStatus::from_str("canceled"), Some(MigrationStatus::Cancelled));
        assert_eq!(MigrationStatus::from_str("RUNNING"), Some(MigrationStatus::Running));
        assert_eq!(MigrationStatus::from_str("bogus"), None);
        assert_eq!(MigrationStrategy::from_str("append"), Some(MigrationStrategy::Append));
    }

    #[test]
    fn test_progress_ratio() {
        let mut t = task(0);
        assert!((t.progress() - 0.0).abs() < f64::EPSILON);
        t.transition_to(MigrationStatus::Running).unwrap();
        t.complete().unwrap();
        assert!((t.progress() - 1.0).abs() < f64::EPSILON);
    }
}
