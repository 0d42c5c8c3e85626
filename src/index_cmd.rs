//! `cidx index`: run the batch embedder against the SQLite stores.

use anyhow::Result;

use catalog_index_core::indexer::{run_index, IndexReport};

use crate::config::Config;
use crate::corpus::SqliteCorpus;
use crate::db;
use crate::embedding;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Command-line overrides for one run.
#[derive(Debug, Clone, Default)]
pub struct IndexArgs {
    pub full: bool,
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Index changed catalog records and print the report.
///
/// The returned report is also the exit-status signal: the caller exits
/// non-zero when any batch failed.
pub async fn run_index_cmd(config: &Config, args: &IndexArgs) -> Result<IndexReport> {
    let client = embedding::create_client(config)?;
    let catalog_pool = db::connect_catalog(config).await?;
    let corpus = SqliteCorpus::new(catalog_pool.clone(), &config.catalog.table)?;

    let index_pool = db::connect(config).await?;
    migrate::apply(&index_pool).await?;
    let store = SqliteStore::new(index_pool.clone());

    let mut options = config.index_options();
    options.full = args.full;
    options.dry_run = args.dry_run;
    options.limit = args.limit;
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size.max(1);
    }

    let report = run_index(&corpus, &store, &store, &client, &options).await?;
    print_report(&report);

    catalog_pool.close().await;
    index_pool.close().await;
    Ok(report)
}

pub fn print_report(report: &IndexReport) {
    if report.dry_run {
        println!("index (dry-run)");
        println!("  records scanned: {}", report.scanned);
        println!("  records needing embeddings: {}", report.changed);
        println!("  delisted records to remove: {}", report.pruned);
        return;
    }

    println!("index");
    println!("  records scanned: {}", report.scanned);
    if report.checksums_unavailable {
        println!("  checksums unavailable: all records treated as changed");
    }
    if report.pruned > 0 {
        println!("  removed delisted records: {}", report.pruned);
    }
    if report.changed == 0 {
        println!("  all records up to date");
        return;
    }
    println!("  changed: {}", report.changed);
    println!("  embedded: {}", report.embedded);
    println!("  provider calls: {}", report.provider_calls);
    if report.skipped > 0 {
        println!("  skipped (bad vectors): {}", report.skipped);
    }
    if report.store_failures > 0 {
        println!("  store write failures: {}", report.store_failures);
    }
    if report.checksum_failures > 0 {
        println!("  checksum write failures: {}", report.checksum_failures);
    }
    if !report.failed_batches.is_empty() {
        println!("  failed batches: {}", report.failed_batches.len());
        for failure in &report.failed_batches {
            println!(
                "    batch {} ({} records, ids {}..={}): {}",
                failure.batch_index,
                failure.record_ids.len(),
                failure.record_ids.first().copied().unwrap_or_default(),
                failure.record_ids.last().copied().unwrap_or_default(),
                failure.error
            );
        }
    }
    println!("  still pending: {}", report.pending());
}
