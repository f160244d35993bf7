//! SQLite implementation of the MigrationTaskRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    count_from_i64, count_to_i64, format_datetime, model_key, parse_datetime,
    parse_optional_datetime, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EmbeddingModelIdentity, MigrationScope, MigrationStatus, MigrationStrategy, MigrationTask,
};
use crate::domain::ports::{MigrationFilter, MigrationTaskRepository};

const ACTIVE_STATUSES: &str = "('pending', 'running')";
const TERMINAL_STATUSES: &str = "('completed', 'failed', 'cancelled')";

#[derive(Clone)]
pub struct SqliteMigrationTaskRepository {
    pool: SqlitePool,
}

impl SqliteMigrationTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Error for a write that matched no non-terminal row.
    async fn rejected_write(&self, id: Uuid, to: MigrationStatus) -> DomainError {
        match self.get(id).await {
            Ok(Some(existing)) => DomainError::InvalidTransition {
                from: existing.status,
                to,
            },
            Ok(None) => DomainError::MigrationNotFound(id),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl MigrationTaskRepository for SqliteMigrationTaskRepository {
    async fn insert(&self, task: &MigrationTask) -> DomainResult<()> {
        let scope_json = serde_json::to_string(&task.scope)?;
        let source = task.source_model_identity.as_ref();

        let result = sqlx::query(
            r#"INSERT INTO migration_tasks (id, source_key, source_provider, source_model_name,
               target_key, target_provider, target_model_name, strategy, scope, status,
               total_count, completed_count, error, cancel_requested,
               created_at, updated_at, started_at, completed_at, archived_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(model_key(source))
        .bind(source.map(|s| s.provider.as_str()))
        .bind(source.map(|s| s.model_name.as_str()))
        .bind(task.target_model_identity.key())
        .bind(&task.target_model_identity.provider)
        .bind(&task.target_model_identity.model_name)
        .bind(task.strategy.as_str())
        .bind(&scope_json)
        .bind(task.status.as_str())
        .bind(count_to_i64(task.total_count))
        .bind(count_to_i64(task.completed_count))
        .bind(&task.error)
        .bind(task.cancel_requested)
        .bind(format_datetime(task.created_at))
        .bind(format_datetime(task.updated_at))
        .bind(task.started_at.map(format_datetime))
        .bind(task.completed_at.map(format_datetime))
        .bind(task.archived_at.map(format_datetime))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing = self
                    .find_active(source, &task.target_model_identity)
                    .await?
                    .map_or_else(Uuid::nil, |t| t.id);
                Err(DomainError::Conflict {
                    source_model: task.source_model_identity.clone(),
                    target: task.target_model_identity.clone(),
                    existing,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<MigrationTask>> {
        let row: Option<MigrationTaskRow> =
            sqlx::query_as("SELECT * FROM migration_tasks WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(MigrationTask::try_from).transpose()
    }

    async fn update(&self, task: &MigrationTask) -> DomainResult<()> {
        let query = format!(
            r#"UPDATE migration_tasks SET status = ?, total_count = ?, completed_count = ?,
               error = ?, updated_at = ?, started_at = ?, completed_at = ?
               WHERE id = ? AND status NOT IN {TERMINAL_STATUSES}"#
        );
        let result = sqlx::query(&query)
            .bind(task.status.as_str())
            .bind(count_to_i64(task.total_count))
            .bind(count_to_i64(task.completed_count))
            .bind(&task.error)
            .bind(format_datetime(task.updated_at))
            .bind(task.started_at.map(format_datetime))
            .bind(task.completed_at.map(format_datetime))
            .bind(task.id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_write(task.id, task.status).await);
        }
        Ok(())
    }

    async fn save_progress(&self, id: Uuid, completed_count: u64) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE migration_tasks SET completed_count = ?, updated_at = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(count_to_i64(completed_count))
        .bind(format_datetime(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_write(id, MigrationStatus::Running).await);
        }
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid) -> DomainResult<bool> {
        let query = format!(
            r#"UPDATE migration_tasks SET cancel_requested = 1, updated_at = ?
               WHERE id = ? AND status IN {ACTIVE_STATUSES}"#
        );
        let result = sqlx::query(&query)
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get(id).await? {
            Some(_) => Ok(false),
            None => Err(DomainError::MigrationNotFound(id)),
        }
    }

    async fn find_active(
        &self,
        source: Option<&EmbeddingModelIdentity>,
        target: &EmbeddingModelIdentity,
    ) -> DomainResult<Option<MigrationTask>> {
        let query = format!(
            r#"SELECT * FROM migration_tasks
               WHERE source_key = ? AND target_key = ? AND status IN {ACTIVE_STATUSES}
               LIMIT 1"#
        );
        let row: Option<MigrationTaskRow> = sqlx::query_as(&query)
            .bind(model_key(source))
            .bind(target.key())
            .fetch_optional(&self.pool)
            .await?;
        row.map(MigrationTask::try_from).transpose()
    }

    async fn list(&self, filter: MigrationFilter) -> DomainResult<Vec<MigrationTask>> {
        let mut query = String::from("SELECT * FROM migration_tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if !filter.include_archived {
            query.push_str(" AND archived_at IS NULL");
        }

        query.push_str(" ORDER BY created_at DESC, id DESC");

        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, MigrationTaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        if let Some(limit) = filter.limit {
            q = q.bind(limit.max(0));
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(MigrationTask::try_from).collect()
    }

    async fn archive_terminal_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let query = format!(
            r#"UPDATE migration_tasks SET archived_at = ?
               WHERE archived_at IS NULL AND status IN {TERMINAL_STATUSES}
               AND completed_at IS NOT NULL AND completed_at < ?"#
        );
        let result = sqlx::query(&query)
            .bind(format_datetime(Utc::now()))
            .bind(format_datetime(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct MigrationTaskRow {
    id: String,
    source_provider: Option<String>,
    source_model_name: Option<String>,
    target_provider: String,
    target_model_name: String,
    strategy: String,
    scope: String,
    status: String,
    total_count: i64,
    completed_count: i64,
    error: Option<String>,
    cancel_requested: bool,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    archived_at: Option<String>,
}

impl TryFrom<MigrationTaskRow> for MigrationTask {
    type Error = DomainError;

    fn try_from(row: MigrationTaskRow) -> Result<Self, Self::Error> {
        let status = MigrationStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;
        let strategy = MigrationStrategy::from_str(&row.strategy).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid strategy: {}", row.strategy))
        })?;
        let scope: MigrationScope = serde_json::from_str(&row.scope)?;

        let source_model_identity = match (row.source_provider, row.source_model_name) {
            (Some(provider), Some(model_name)) => {
                Some(EmbeddingModelIdentity::new(model_name, provider))
            }
            _ => None,
        };

        Ok(MigrationTask {
            id: parse_uuid(&row.id)?,
            source_model_identity,
            target_model_identity: EmbeddingModelIdentity::new(
                row.target_model_name,
                row.target_provider,
            ),
            strategy,
            scope,
            status,
            total_count: count_from_i64(row.total_count),
            completed_count: count_from_i64(row.completed_count),
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            error: row.error,
            cancel_requested: row.cancel_requested,
            archived_at: parse_optional_datetime(row.archived_at)?,
        })
    }
}
