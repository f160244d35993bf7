//! SQLite-backed vector store.
//!
//! Items are stored once per model under `model_key`. A replace migration
//! marks the source row superseded instead of deleting it, so an
//! interrupted migration never loses content.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::{count_from_i64, count_to_i64, format_datetime, model_key};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EmbeddingModelIdentity, MigrationScope, MigrationStrategy};
use crate::domain::ports::{EmbeddedItem, StoredItem, VectorStore};

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store items embedded by `model`, replacing any current row for the same id.
    pub async fn upsert_items(
        &self,
        model: Option<&EmbeddingModelIdentity>,
        items: &[(StoredItem, Option<Vec<f32>>)],
    ) -> DomainResult<()> {
        let key = model_key(model);
        let now = format_datetime(Utc::now());
        let mut tx = self.pool.begin().await?;
        for (item, vector) in items {
            sqlx::query(
                r#"INSERT INTO embedded_items (item_id, model_key, content, vector, superseded, updated_at)
                   VALUES (?, ?, ?, ?, 0, ?)
                   ON CONFLICT(item_id, model_key) DO UPDATE SET
                       content = excluded.content,
                       vector = excluded.vector,
                       superseded = 0,
                       updated_at = excluded.updated_at"#,
            )
            .bind(&item.item_id)
            .bind(&key)
            .bind(&item.content)
            .bind(vector.as_deref().map(encode_vector))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The current vector for an item under `model`.
    pub async fn get_vector(
        &self,
        model: Option<&EmbeddingModelIdentity>,
        item_id: &str,
    ) -> DomainResult<Option<Vec<f32>>> {
        let row: Option<(Option<Vec<u8>>,)> = sqlx::query_as(
            "SELECT vector FROM embedded_items WHERE item_id = ? AND model_key = ? AND superseded = 0",
        )
        .bind(item_id)
        .bind(model_key(model))
        .fetch_optional(&self.pool)
        .await?;
        row.and_then(|(bytes,)| bytes)
            .map(|bytes| decode_vector(&bytes))
            .transpose()
    }
}

/// Little-endian `f32` packing.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> DomainResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(DomainError::SerializationError(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn fetch_batch(
        &self,
        source: Option<&EmbeddingModelIdentity>,
        scope: &MigrationScope,
        after: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<StoredItem>> {
        let mut query = String::from(
            "SELECT item_id, content FROM embedded_items WHERE model_key = ? AND superseded = 0",
        );
        let mut bindings: Vec<String> = vec![model_key(source)];

        if let Some(after) = after {
            query.push_str(" AND item_id > ?");
            bindings.push(after.to_string());
        }
        if let MigrationScope::Subset { selector } = scope {
            let ids: Vec<&str> = selector
                .item_ids
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .collect();
            let placeholders = vec!["?"; ids.len()].join(", ");
            query.push_str(&format!(" AND item_id IN ({placeholders})"));
            bindings.extend(ids.into_iter().map(ToString::to_string));
        }
        query.push_str(" ORDER BY item_id LIMIT ?");

        let mut q = sqlx::query_as::<_, (String, String)>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let rows = q
            .bind(count_to_i64(limit as u64))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(item_id, content)| StoredItem { item_id, content })
            .collect())
    }

    async fn write(
        &self,
        target: &EmbeddingModelIdentity,
        source: Option<&EmbeddingModelIdentity>,
        vectors: &[EmbeddedItem],
        strategy: MigrationStrategy,
    ) -> DomainResult<()> {
        let target_key = target.key();
        let source_key = model_key(source);
        let now = format_datetime(Utc::now());

        let mut tx = self.pool.begin().await?;
        for item in vectors {
            let inserted = sqlx::query(
                r#"INSERT INTO embedded_items (item_id, model_key, content, vector, superseded, updated_at)
                   SELECT item_id, ?, content, ?, 0, ? FROM embedded_items
                   WHERE item_id = ? AND model_key = ?
                   ON CONFLICT(item_id, model_key) DO UPDATE SET
                       content = excluded.content,
                       vector = excluded.vector,
                       superseded = 0,
                       updated_at = excluded.updated_at"#,
            )
            .bind(&target_key)
            .bind(encode_vector(&item.vector))
            .bind(&now)
            .bind(&item.item_id)
            .bind(&source_key)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                // Dropping the transaction rolls back the partial batch.
                return Err(DomainError::ExecutionFailed(format!(
                    "item {} has no stored content for the source model",
                    item.item_id
                )));
            }

            if strategy == MigrationStrategy::Replace {
                sqlx::query(
                    r#"UPDATE embedded_items SET superseded = 1, updated_at = ?
                       WHERE item_id = ? AND model_key = ?"#,
                )
                .bind(&now)
                .bind(&item.item_id)
                .bind(&source_key)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count_items(&self, model: Option<&EmbeddingModelIdentity>) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM embedded_items WHERE model_key = ? AND superseded = 0",
        )
        .bind(model_key(model))
        .fetch_one(&self.pool)
        .await?;
        Ok(count_from_i64(count))
    }
}
