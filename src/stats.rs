//! Index statistics and health overview.
//!
//! Summarizes how much of the catalog is embedded, which models produced
//! the stored vectors, and how fresh they are. Used by `cidx stats`.

use anyhow::Result;
use sqlx::Row;
use tracing::warn;

use crate::config::Config;
use crate::corpus::SqliteCorpus;
use crate::db;
use crate::migrate;

/// Run the stats command: query both databases and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
        .fetch_one(&pool)
        .await?;
    let total_checksums: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checksums")
        .fetch_one(&pool)
        .await?;
    let last_update: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM embeddings")
        .fetch_one(&pool)
        .await?;

    let catalog_count = match catalog_size(config).await {
        Ok(n) => Some(n as i64),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "catalog unavailable");
            None
        }
    };

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("catalog-index: Index Stats");
    println!("==========================");
    println!();
    println!("  Index:       {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Catalog:     {} (table {})",
        config.catalog.path.display(),
        config.catalog.table
    );
    println!();
    match catalog_count {
        Some(total) => {
            println!("  Records:     {}", total);
            println!(
                "  Embedded:    {} / {} ({}%)",
                total_embedded,
                total,
                if total > 0 {
                    (total_embedded * 100) / total
                } else {
                    0
                }
            );
        }
        None => {
            println!("  Records:     unavailable");
            println!("  Embedded:    {}", total_embedded);
        }
    }
    println!("  Checksums:   {}", total_checksums);
    println!(
        "  Last update: {}",
        last_update
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    let model_rows = sqlx::query(
        r#"
        SELECT model, dims, COUNT(*) AS n
        FROM embeddings
        GROUP BY model, dims
        ORDER BY n DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !model_rows.is_empty() {
        println!();
        println!("  By model:");
        println!("  {:<36} {:>6} {:>10}", "MODEL", "DIMS", "VECTORS");
        println!("  {}", "-".repeat(54));
        for row in &model_rows {
            let model: String = row.get("model");
            let dims: i64 = row.get("dims");
            let n: i64 = row.get("n");
            println!("  {:<36} {:>6} {:>10}", model, dims, n);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

async fn catalog_size(config: &Config) -> Result<usize> {
    let pool = db::connect_catalog(config).await?;
    let corpus = SqliteCorpus::new(pool.clone(), &config.catalog.table)?;
    let n = corpus.count().await;
    pool.close().await;
    n
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
