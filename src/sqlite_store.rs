//! SQLite-backed [`VectorStore`] and [`ChecksumStore`].
//!
//! Vectors are stored as little-endian f32 blobs next to a JSON copy of
//! the source record. Nearest-neighbour search is brute force: rows are
//! decoded and scored in parallel with rayon on a blocking thread, then
//! reduced with a bounded top-K heap. Rows that cannot be read or decoded
//! are skipped with a warning.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rayon::prelude::*;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::warn;

use catalog_index_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use catalog_index_core::models::{EmbeddingRecord, SourceRecord};
use catalog_index_core::store::{top_k, ChecksumStore, Neighbor, VectorStore};

/// SQLite implementation of the index stores over the `embeddings` and
/// `checksums` tables.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Raw columns of one `embeddings` row.
struct StoredRow {
    record_id: i64,
    model: String,
    blob: Vec<u8>,
    metadata_json: String,
    created_at: i64,
    updated_at: i64,
}

impl StoredRow {
    /// `None`, with a warning, when a column holds a value of the wrong
    /// storage class (e.g. an INTEGER where the vector blob belongs).
    fn from_row(row: &SqliteRow) -> Option<Self> {
        match Self::try_from_row(row) {
            Ok(stored) => Some(stored),
            Err(e) => {
                let record_id: Option<i64> = row.try_get("record_id").ok();
                warn!(record_id = ?record_id, error = %e, "skipping mistyped embedding row");
                None
            }
        }
    }

    fn try_from_row(row: &SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            record_id: row.try_get("record_id")?,
            model: row.try_get("model")?,
            blob: row.try_get("embedding")?,
            metadata_json: row.try_get("metadata_json")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// `None` when the blob or the metadata cannot be decoded.
    fn decode(self) -> Option<EmbeddingRecord> {
        let Some(vector) = blob_to_vec(&self.blob) else {
            warn!(record_id = self.record_id, bytes = self.blob.len(), "skipping malformed vector");
            return None;
        };
        let record: SourceRecord = match serde_json::from_str(&self.metadata_json) {
            Ok(r) => r,
            Err(e) => {
                warn!(record_id = self.record_id, error = %e, "skipping unparsable metadata");
                return None;
            }
        };
        Some(EmbeddingRecord {
            record_id: self.record_id,
            vector,
            record,
            model: self.model,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_EMBEDDINGS: &str =
    "SELECT record_id, model, embedding, metadata_json, created_at, updated_at FROM embeddings";

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, vector: &[f32], record: &SourceRecord, model: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let blob = vec_to_blob(vector);
        let metadata_json = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO embeddings (record_id, model, dims, embedding, metadata_json,
                                    created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(&blob)
        .bind(&metadata_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, record_id: i64) -> Result<Option<EmbeddingRecord>> {
        let row = sqlx::query(&format!("{} WHERE record_id = ?", SELECT_EMBEDDINGS))
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => match StoredRow::from_row(&row).and_then(StoredRow::decode) {
                Some(rec) => Ok(Some(rec)),
                None => bail!("stored embedding for record {} is malformed", record_id),
            },
        }
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query(SELECT_EMBEDDINGS)
            .fetch_all(&self.pool)
            .await?;
        let stored: Vec<StoredRow> = rows.iter().filter_map(StoredRow::from_row).collect();
        let query = query.to_vec();

        // Decoding and scoring is CPU-bound; keep it off the async workers.
        let ranked = tokio::task::spawn_blocking(move || {
            let scored: Vec<(f32, i64, EmbeddingRecord)> = stored
                .into_par_iter()
                .filter_map(StoredRow::decode)
                .map(|rec| (cosine_similarity(&query, &rec.vector), rec.record_id, rec))
                .collect();
            top_k(scored, k)
        })
        .await
        .context("similarity scoring task failed")?;

        Ok(ranked
            .into_iter()
            .map(|(similarity, _, record)| Neighbor { record, similarity })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn record_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT record_id FROM embeddings")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn remove(&self, record_ids: &[i64]) -> Result<usize> {
        let mut removed = 0;
        for chunk in record_ids.chunks(DELETE_CHUNK) {
            removed += delete_ids(&self.pool, "embeddings", chunk).await?;
        }
        Ok(removed as usize)
    }
}

/// Stays well under SQLite's bound-parameter limit.
const DELETE_CHUNK: usize = 500;

async fn delete_ids(pool: &SqlitePool, table: &str, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("DELETE FROM {} WHERE record_id IN (", table));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let result = query.build().execute(pool).await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl ChecksumStore for SqliteStore {
    async fn load_checksums(&self) -> Result<HashMap<i64, String>> {
        let rows = sqlx::query("SELECT record_id, fingerprint FROM checksums")
            .fetch_all(&self.pool)
            .await?;
        // A mistyped row is dropped, which only costs a re-embed.
        Ok(rows
            .iter()
            .filter_map(|row| {
                match (row.try_get("record_id"), row.try_get("fingerprint")) {
                    (Ok(id), Ok(fp)) => Some((id, fp)),
                    (_, Err(e)) | (Err(e), _) => {
                        warn!(error = %e, "skipping mistyped checksum row");
                        None
                    }
                }
            })
            .collect())
    }

    async fn put_checksum(&self, record_id: i64, fingerprint: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checksums (record_id, fingerprint, checked_at)
            VALUES (?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                checked_at = excluded.checked_at
            "#,
        )
        .bind(record_id)
        .bind(fingerprint)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_checksums(&self) -> Result<()> {
        sqlx::query("DELETE FROM checksums")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_checksums(&self, record_ids: &[i64]) -> Result<()> {
        for chunk in record_ids.chunks(DELETE_CHUNK) {
            delete_ids(&self.pool, "checksums", chunk).await?;
        }
        Ok(())
    }
}
