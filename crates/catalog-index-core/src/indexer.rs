//! Incremental batch embedding.
//!
//! One run reads the whole catalog, fingerprints every record, and embeds
//! only the records whose fingerprint is new or different:
//!
//! ```text
//! CorpusReader ──► diff(checksums) ──► chunks(batch_size) ──► provider.embed
//!                                                              │
//!                            put_checksum ◄── VectorStore::upsert
//! ```
//!
//! A failed batch is recorded in the [`IndexReport`] and the run moves on
//! to the next batch. A record's checksum is written only after its
//! vector has been stored, so anything that fails stays stale and is
//! picked up by the next run. Ids that disappeared from the catalog are
//! pruned from both stores.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::ModelProvider;
use crate::fingerprint::{diff, embedding_text, DEFAULT_MAX_DESCRIPTION_CHARS};
use crate::models::SourceRecord;
use crate::store::{ChecksumStore, CorpusReader, VectorStore};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for a single indexing run.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub batch_size: usize,
    pub max_description_chars: usize,
    /// Per-batch provider timeout.
    pub timeout: Duration,
    /// Ignore stored checksums and re-embed everything.
    pub full: bool,
    /// Count what would be embedded without calling the provider.
    pub dry_run: bool,
    /// Cap on changed records processed this run, lowest ids first.
    pub limit: Option<usize>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_description_chars: DEFAULT_MAX_DESCRIPTION_CHARS,
            timeout: DEFAULT_BATCH_TIMEOUT,
            full: false,
            dry_run: false,
            limit: None,
        }
    }
}

/// A batch whose embedding call failed.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// Zero-based position of the batch within this run.
    pub batch_index: usize,
    pub record_ids: Vec<i64>,
    pub error: String,
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub scanned: usize,
    pub changed: usize,
    pub embedded: usize,
    /// Records dropped because the returned vector had the wrong shape.
    pub skipped: usize,
    pub store_failures: usize,
    pub checksum_failures: usize,
    pub provider_calls: usize,
    /// Ids gone from the catalog whose embeddings were removed (or, in a
    /// dry run, would be).
    pub pruned: usize,
    pub failed_batches: Vec<BatchFailure>,
    /// Stored checksums could not be read; every record counted as changed.
    pub checksums_unavailable: bool,
    pub dry_run: bool,
}

impl IndexReport {
    /// Records that were changed but are still stale after this run.
    pub fn pending(&self) -> usize {
        if self.dry_run {
            return self.changed;
        }
        self.changed.saturating_sub(self.embedded)
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_batches.is_empty()
    }
}

/// Run one incremental indexing pass.
///
/// Returns `Err` only when the catalog itself cannot be read. Provider,
/// vector store and checksum failures are logged and counted in the
/// report instead.
pub async fn run_index(
    corpus: &dyn CorpusReader,
    checksums: &dyn ChecksumStore,
    vectors: &dyn VectorStore,
    provider: &dyn ModelProvider,
    options: &IndexOptions,
) -> Result<IndexReport> {
    let mut report = IndexReport {
        dry_run: options.dry_run,
        ..IndexReport::default()
    };

    let records = corpus
        .read_all()
        .await
        .context("failed to read source catalog")?;
    report.scanned = records.len();

    let stored = if options.full {
        None
    } else {
        match checksums.load_checksums().await {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "checksum store unavailable, re-embedding all records");
                report.checksums_unavailable = true;
                None
            }
        }
    };

    let mut changed = diff(&records, stored.as_ref(), options.max_description_chars);
    changed.sort_by_key(|(record, _)| record.id);
    if let Some(limit) = options.limit {
        changed.truncate(limit);
    }
    report.changed = changed.len();

    prune_removed(&records, stored.as_ref(), checksums, vectors, options.dry_run, &mut report).await;

    if options.dry_run || changed.is_empty() {
        info!(
            scanned = report.scanned,
            changed = report.changed,
            dry_run = options.dry_run,
            "nothing to embed"
        );
        return Ok(report);
    }

    if options.full {
        if let Err(e) = checksums.clear_checksums().await {
            warn!(error = %format!("{:#}", e), "failed to clear checksums before full rebuild");
        }
    }

    let batch_size = options.batch_size.max(1);

    for (batch_index, batch) in changed.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch
            .iter()
            .map(|(record, _)| embedding_text(record, options.max_description_chars))
            .collect();
        let record_ids: Vec<i64> = batch.iter().map(|(record, _)| record.id).collect();

        report.provider_calls += 1;
        let embedded = match provider.embed_labeled(&texts, options.timeout).await {
            Ok(e) if e.vectors.len() == batch.len() => e,
            Ok(e) => {
                let error = format!(
                    "provider returned {} vectors for {} inputs",
                    e.vectors.len(),
                    batch.len()
                );
                warn!(batch = batch_index, %error, "embedding batch rejected");
                report.failed_batches.push(BatchFailure {
                    batch_index,
                    record_ids,
                    error,
                });
                continue;
            }
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(batch = batch_index, %error, "embedding batch failed");
                report.failed_batches.push(BatchFailure {
                    batch_index,
                    record_ids,
                    error,
                });
                continue;
            }
        };

        for ((record, fp), vector) in batch.iter().zip(embedded.vectors.iter()) {
            if !usable_vector(vector, embedded.dims) {
                warn!(
                    record_id = record.id,
                    got = vector.len(),
                    expected = embedded.dims,
                    "skipping record with unusable embedding"
                );
                report.skipped += 1;
                continue;
            }
            store_one(vectors, checksums, record, fp, vector, &embedded.model, &mut report).await;
        }
        debug!(batch = batch_index, size = batch.len(), "batch done");
    }

    info!(
        scanned = report.scanned,
        changed = report.changed,
        embedded = report.embedded,
        skipped = report.skipped,
        store_failures = report.store_failures,
        failed_batches = report.failed_batches.len(),
        provider_calls = report.provider_calls,
        pruned = report.pruned,
        "index run complete"
    );
    Ok(report)
}

/// Remove embeddings and checksums of ids no longer in the catalog.
///
/// Skipped when the catalog came back empty, so a truncated source table
/// cannot wipe the index. Failures are logged; leftovers are retried on
/// the next run.
async fn prune_removed(
    records: &[SourceRecord],
    stored: Option<&HashMap<i64, String>>,
    checksums: &dyn ChecksumStore,
    vectors: &dyn VectorStore,
    dry_run: bool,
    report: &mut IndexReport,
) {
    let indexed = match vectors.record_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "cannot list indexed records, skipping prune");
            return;
        }
    };
    let live: HashSet<i64> = records.iter().map(|r| r.id).collect();
    let gone: Vec<i64> = indexed
        .into_iter()
        .chain(stored.into_iter().flat_map(|s| s.keys().copied()))
        .filter(|id| !live.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if gone.is_empty() {
        return;
    }
    if records.is_empty() {
        warn!(stale = gone.len(), "catalog returned no records, not pruning the index");
        return;
    }
    if dry_run {
        report.pruned = gone.len();
        return;
    }

    match vectors.remove(&gone).await {
        Ok(n) => report.pruned = n,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "failed to remove delisted records");
            return;
        }
    }
    if let Err(e) = checksums.remove_checksums(&gone).await {
        warn!(error = %format!("{:#}", e), "failed to remove checksums of delisted records");
    }
    info!(pruned = report.pruned, "removed records no longer in the catalog");
}

/// `dims == 0` means the provider does not declare a dimension.
fn usable_vector(vector: &[f32], dims: usize) -> bool {
    !vector.is_empty() && (dims == 0 || vector.len() == dims) && vector.iter().all(|x| x.is_finite())
}

async fn store_one(
    vectors: &dyn VectorStore,
    checksums: &dyn ChecksumStore,
    record: &SourceRecord,
    fp: &str,
    vector: &[f32],
    model: &str,
    report: &mut IndexReport,
) {
    if let Err(e) = vectors.upsert(vector, record, model).await {
        warn!(record_id = record.id, error = %format!("{:#}", e), "vector store write failed");
        report.store_failures += 1;
        return;
    }
    report.embedded += 1;

    // The vector is in place; a missing checksum only costs a re-embed.
    if let Err(e) = checksums.put_checksum(record.id, fp).await {
        warn!(record_id = record.id, error = %format!("{:#}", e), "checksum write failed");
        report.checksum_failures += 1;
    }
}
