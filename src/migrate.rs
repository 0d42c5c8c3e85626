use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the index tables. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One embedding per record, metadata denormalized as JSON
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            record_id INTEGER PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checksums (
            record_id INTEGER PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            checked_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_updated_at ON embeddings(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
