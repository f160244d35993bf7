//! SQLite implementation of the UsageLedger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::{count_from_i64, count_to_i64, format_datetime, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EmbeddingModelIdentity, MigrationStrategy, UsageRecord};
use crate::domain::ports::UsageLedger;

#[derive(Clone)]
pub struct SqliteUsageLedger {
    pool: SqlitePool,
}

impl SqliteUsageLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn add_usage(
        tx: &mut Transaction<'_, Sqlite>,
        identity: &EmbeddingModelIdentity,
        count: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let at = format_datetime(at);
        sqlx::query(
            r#"INSERT INTO embedding_usage (provider, model_name, embedding_count, first_used_at, last_used_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(provider, model_name) DO UPDATE SET
                   embedding_count = embedding_count + excluded.embedding_count,
                   first_used_at = CASE
                       WHEN first_used_at IS NULL OR excluded.first_used_at < first_used_at
                       THEN excluded.first_used_at ELSE first_used_at END,
                   last_used_at = CASE
                       WHEN last_used_at IS NULL OR excluded.last_used_at > last_used_at
                       THEN excluded.last_used_at ELSE last_used_at END"#,
        )
        .bind(&identity.provider)
        .bind(&identity.model_name)
        .bind(count_to_i64(count))
        .bind(&at)
        .bind(&at)
        .execute(&mut **tx)
        .await
        .map_err(ledger_error)?;
        Ok(())
    }
}

fn ledger_error(err: sqlx::Error) -> DomainError {
    DomainError::LedgerUnavailable(err.to_string())
}

#[async_trait]
impl UsageLedger for SqliteUsageLedger {
    async fn list_records(&self) -> DomainResult<Vec<UsageRecord>> {
        let rows: Vec<UsageRow> =
            sqlx::query_as("SELECT * FROM embedding_usage ORDER BY provider, model_name")
                .fetch_all(&self.pool)
                .await
                .map_err(ledger_error)?;
        rows.into_iter().map(UsageRecord::try_from).collect()
    }

    async fn get_record(
        &self,
        identity: &EmbeddingModelIdentity,
    ) -> DomainResult<Option<UsageRecord>> {
        let row: Option<UsageRow> =
            sqlx::query_as("SELECT * FROM embedding_usage WHERE provider = ? AND model_name = ?")
                .bind(&identity.provider)
                .bind(&identity.model_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(ledger_error)?;
        row.map(UsageRecord::try_from).transpose()
    }

    async fn record_usage(
        &self,
        identity: &EmbeddingModelIdentity,
        count: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(ledger_error)?;
        Self::add_usage(&mut tx, identity, count, at).await?;
        tx.commit().await.map_err(ledger_error)?;
        Ok(())
    }

    async fn apply_migrated_batch(
        &self,
        source: Option<&EmbeddingModelIdentity>,
        target: &EmbeddingModelIdentity,
        count: u64,
        strategy: MigrationStrategy,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(ledger_error)?;
        Self::add_usage(&mut tx, target, count, at).await?;

        if let (MigrationStrategy::Replace, Some(source)) = (strategy, source) {
            sqlx::query(
                r#"UPDATE embedding_usage
                   SET embedding_count = MAX(embedding_count - ?, 0)
                   WHERE provider = ? AND model_name = ?"#,
            )
            .bind(count_to_i64(count))
            .bind(&source.provider)
            .bind(&source.model_name)
            .execute(&mut *tx)
            .await
            .map_err(ledger_error)?;
        }

        tx.commit().await.map_err(ledger_error)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    provider: String,
    model_name: String,
    embedding_count: i64,
    first_used_at: Option<String>,
    last_used_at: Option<String>,
}

impl TryFrom<UsageRow> for UsageRecord {
    type Error = DomainError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        Ok(UsageRecord {
            identity: EmbeddingModelIdentity::new(row.model_name, row.provider),
            embedding_count: count_from_i64(row.embedding_count),
            first_used_at: parse_optional_datetime(row.first_used_at)?,
            last_used_at: parse_optional_datetime(row.last_used_at)?,
        })
    }
}
