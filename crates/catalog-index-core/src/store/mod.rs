//! Storage abstraction for catalog-index.
//!
//! Three narrow traits separate the collaborators of the batch embedder
//! and search engine:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`CorpusReader`] | Read-only access to the current source records |
//! | [`ChecksumStore`] | One fingerprint per record id |
//! | [`VectorStore`] | Embeddings with denormalized metadata, nearest-neighbour lookup |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Backends with native vector operators may rank inside the store; the
//! brute-force backends use [`top_k`] over [`cosine_similarity`](crate::embedding::cosine_similarity).

pub mod memory;

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EmbeddingRecord, SourceRecord};

/// A nearest-neighbour match.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub record: EmbeddingRecord,
    /// Cosine similarity to the query vector.
    pub similarity: f32,
}

impl Neighbor {
    /// Cosine distance, `1 - similarity`, in `[0.0, 2.0]`.
    pub fn distance(&self) -> f32 {
        1.0 - self.similarity
    }
}

/// Source catalog, read fresh on every indexing run.
#[async_trait]
pub trait CorpusReader: Send + Sync {
    async fn read_all(&self) -> Result<Vec<SourceRecord>>;
}

/// Persisted fingerprints used for change detection.
#[async_trait]
pub trait ChecksumStore: Send + Sync {
    /// All stored fingerprints keyed by record id.
    async fn load_checksums(&self) -> Result<HashMap<i64, String>>;

    /// Insert or refresh the fingerprint for one record.
    async fn put_checksum(&self, record_id: i64, fingerprint: &str) -> Result<()>;

    /// Forget every fingerprint, forcing a full re-embed on the next run.
    async fn clear_checksums(&self) -> Result<()>;

    async fn remove_checksums(&self, record_ids: &[i64]) -> Result<()>;
}

/// Embedding persistence with exact and nearest-neighbour lookup.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the embedding for `record.id`.
    ///
    /// `created_at` is kept from the existing row on replace.
    async fn upsert(&self, vector: &[f32], record: &SourceRecord, model: &str) -> Result<()>;

    async fn get(&self, record_id: i64) -> Result<Option<EmbeddingRecord>>;

    /// Up to `k` stored records ranked by similarity to `query`,
    /// best first, ties broken by record id ascending.
    ///
    /// Rows whose stored vector cannot be decoded are skipped.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    async fn count(&self) -> Result<usize>;

    /// Ids of every stored embedding, including undecodable rows.
    async fn record_ids(&self) -> Result<Vec<i64>>;

    /// Delete the given embeddings, returning how many existed.
    async fn remove(&self, record_ids: &[i64]) -> Result<usize>;
}

/// Item ordered by score descending, then id ascending.
struct Ranked<T> {
    score: f32,
    id: i64,
    item: T,
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Ranked<T> {}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ranked<T> {
    /// Greater means ranks earlier.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Keep the best `k` of `(score, id, item)` triples without sorting the
/// whole input. Output is best first; equal scores order by id ascending.
pub fn top_k<T, I>(items: I, k: usize) -> Vec<(f32, i64, T)>
where
    I: IntoIterator<Item = (f32, i64, T)>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<Ranked<T>>> = BinaryHeap::with_capacity(k + 1);
    for (score, id, item) in items {
        let candidate = Ranked { score, id, item };
        if heap.len() < k {
            heap.push(Reverse(candidate));
            continue;
        }
        let beats_worst = heap
            .peek()
            .is_some_and(|Reverse(worst)| candidate > *worst);
        if beats_worst {
            heap.pop();
            heap.push(Reverse(candidate));
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(r)| (r.score, r.id, r.item))
        .collect()
}
