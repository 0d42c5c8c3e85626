//! Read-only access to the source catalog.
//!
//! Every nullable column is converted exactly once here into
//! `Option<String>` / `Option<i64>`; blank strings become `None` so the
//! core never has to distinguish "missing" from "empty". A row that still
//! cannot be converted is skipped with a warning rather than failing the
//! whole read.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use catalog_index_core::models::SourceRecord;
use catalog_index_core::store::CorpusReader;

use crate::config::is_valid_identifier;

/// [`CorpusReader`] over a SQLite catalog table.
pub struct SqliteCorpus {
    pool: SqlitePool,
    table: String,
}

impl SqliteCorpus {
    /// `table` must be a plain identifier; it is interpolated into SQL.
    pub fn new(pool: SqlitePool, table: &str) -> Result<Self> {
        if !is_valid_identifier(table) {
            anyhow::bail!("invalid catalog table name: '{}'", table);
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

/// Trimmed text, or `None` for NULL and blank values.
fn opt_text(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    let value: Option<String> = row
        .try_get(column)
        .with_context(|| format!("column '{}'", column))?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn to_record(row: &SqliteRow) -> Result<SourceRecord> {
    let id: i64 = row.try_get("id")?;
    let title = opt_text(row, "title")?.unwrap_or_default();
    Ok(SourceRecord {
        id,
        title,
        name: opt_text(row, "name")?,
        description: opt_text(row, "description")?,
        short_description: opt_text(row, "short_description")?,
        sku: opt_text(row, "sku")?,
        min_price: opt_text(row, "min_price")?,
        max_price: opt_text(row, "max_price")?,
        stock_status: opt_text(row, "stock_status")?,
        stock_quantity: row.try_get("stock_quantity")?,
        tags: opt_text(row, "tags")?,
    })
}

#[async_trait]
impl CorpusReader for SqliteCorpus {
    async fn read_all(&self) -> Result<Vec<SourceRecord>> {
        // Every text column is cast so INTEGER/REAL cells in loosely typed
        // catalogs decode as text.
        let sql = format!(
            r#"
            SELECT id,
                   CAST(title AS TEXT) AS title,
                   CAST(name AS TEXT) AS name,
                   CAST(description AS TEXT) AS description,
                   CAST(short_description AS TEXT) AS short_description,
                   CAST(sku AS TEXT) AS sku,
                   CAST(min_price AS TEXT) AS min_price,
                   CAST(max_price AS TEXT) AS max_price,
                   CAST(stock_status AS TEXT) AS stock_status,
                   CAST(stock_quantity AS INTEGER) AS stock_quantity,
                   CAST(tags AS TEXT) AS tags
            FROM {}
            ORDER BY id ASC
            "#,
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read catalog table '{}'", self.table))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match to_record(row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let id: Option<i64> = row.try_get("id").ok();
                    warn!(id = ?id, error = %format!("{:#}", e), "skipping malformed catalog row");
                }
            }
        }
        if records.len() < rows.len() {
            warn!(
                skipped = rows.len() - records.len(),
                read = records.len(),
                "catalog rows skipped"
            );
        }
        Ok(records)
    }
}
