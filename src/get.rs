//! Stored embedding lookup by record id.
//!
//! Prints the denormalized record and embedding metadata held in the
//! index. Used by `cidx get` to check what a record was embedded from.

use anyhow::{bail, Result};
use serde::Serialize;

use catalog_index_core::models::SourceRecord;
use catalog_index_core::store::VectorStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct StoredRecordResponse {
    pub record: SourceRecord,
    pub model: String,
    pub dims: usize,
    /// Euclidean norm of the stored vector.
    pub norm: f32,
    pub created_at: String,
    pub updated_at: String,
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub async fn get_record(config: &Config, id: i64) -> Result<StoredRecordResponse> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let found = store.get(id).await;
    pool.close().await;

    let Some(rec) = found? else {
        bail!("record not indexed: {}", id);
    };

    let norm = rec.vector.iter().map(|x| x * x).sum::<f32>().sqrt();

    Ok(StoredRecordResponse {
        dims: rec.dims(),
        norm,
        model: rec.model,
        created_at: format_ts_iso(rec.created_at),
        updated_at: format_ts_iso(rec.updated_at),
        record: rec.record,
    })
}

pub async fn run_get(config: &Config, id: i64, json: bool) -> Result<()> {
    let resp = get_record(config, id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    let r = &resp.record;
    println!("--- Record {} ---", r.id);
    println!("title: {}", r.title);
    let optional = [
        ("name", &r.name),
        ("sku", &r.sku),
        ("min_price", &r.min_price),
        ("max_price", &r.max_price),
        ("stock_status", &r.stock_status),
        ("tags", &r.tags),
    ];
    for (label, value) in optional {
        if let Some(v) = value {
            println!("{}: {}", label, v);
        }
    }
    if let Some(q) = r.stock_quantity {
        println!("stock_quantity: {}", q);
    }
    println!("model: {}", resp.model);
    println!("dims: {}", resp.dims);
    println!("norm: {:.4}", resp.norm);
    println!("created_at: {}", resp.created_at);
    println!("updated_at: {}", resp.updated_at);

    if let Some(short) = &r.short_description {
        println!();
        println!("--- Short description ---");
        println!("{}", short);
    }
    if let Some(desc) = &r.description {
        println!();
        println!("--- Description ---");
        println!("{}", desc);
    }
    Ok(())
}
