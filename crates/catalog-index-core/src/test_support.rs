//! Deterministic test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::{ChatMessage, ModelProvider};
use crate::models::{EmbeddingRecord, SourceRecord};
use crate::store::memory::InMemoryStore;
use crate::store::{ChecksumStore, Neighbor, VectorStore};
use crate::tokens::tokenize;

pub const DIMS: usize = 64;

/// Bag-of-words embedder: each token bumps one FNV-hashed bucket, so
/// texts sharing tokens get positive cosine similarity.
pub struct BagOfWords {
    model: String,
    pub calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
    /// 1-based call numbers that fail.
    pub fail_calls: Mutex<HashSet<usize>>,
    pub fail_all: AtomicBool,
    /// Return this many fewer vectors than inputs.
    pub drop_vectors: AtomicUsize,
}

impl BagOfWords {
    pub fn new() -> Self {
        Self::with_model("bow-64")
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            fail_calls: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
            drop_vectors: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(calls: &[usize]) -> Self {
        let p = Self::new();
        p.fail_calls.lock().unwrap().extend(calls.iter().copied());
        p
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embed_one(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for token in tokenize(text) {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in token.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl ModelProvider for BagOfWords {
    fn name(&self) -> &str {
        "bag-of-words"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String], _timeout: Duration) -> Result<Vec<Vec<f32>>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.batch_sizes.lock().unwrap().push(texts.len());
        if self.fail_all.load(Ordering::SeqCst) || self.fail_calls.lock().unwrap().contains(&n) {
            bail!("provider unavailable (call {})", n);
        }
        let mut out: Vec<Vec<f32>> = texts.iter().map(|t| Self::embed_one(t)).collect();
        let drop = self.drop_vectors.load(Ordering::SeqCst).min(out.len());
        out.truncate(out.len() - drop);
        Ok(out)
    }

    async fn complete(&self, messages: &[ChatMessage], _timeout: Duration) -> Result<String> {
        Ok(format!("{} messages", messages.len()))
    }
}

/// [`InMemoryStore`] wrapper with injectable failures.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    pub fail_upsert_ids: Mutex<HashSet<i64>>,
    pub fail_load: AtomicBool,
    pub fail_nearest: AtomicBool,
}

#[async_trait]
impl VectorStore for FaultyStore {
    async fn upsert(&self, vector: &[f32], record: &SourceRecord, model: &str) -> Result<()> {
        if self.fail_upsert_ids.lock().unwrap().contains(&record.id) {
            bail!("disk full writing record {}", record.id);
        }
        self.inner.upsert(vector, record, model).await
    }
    async fn get(&self, record_id: i64) -> Result<Option<EmbeddingRecord>> {
        self.inner.get(record_id).await
    }
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.fail_nearest.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        self.inner.nearest(query, k).await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
    async fn record_ids(&self) -> Result<Vec<i64>> {
        self.inner.record_ids().await
    }
    async fn remove(&self, record_ids: &[i64]) -> Result<usize> {
        self.inner.remove(record_ids).await
    }
}

#[async_trait]
impl ChecksumStore for FaultyStore {
    async fn load_checksums(&self) -> Result<HashMap<i64, String>> {
        if self.fail_load.load(Ordering::SeqCst) {
            bail!("checksum table locked");
        }
        self.inner.load_checksums().await
    }
    async fn put_checksum(&self, record_id: i64, fingerprint: &str) -> Result<()> {
        self.inner.put_checksum(record_id, fingerprint).await
    }
    async fn clear_checksums(&self) -> Result<()> {
        self.inner.clear_checksums().await
    }
    async fn remove_checksums(&self, record_ids: &[i64]) -> Result<()> {
        self.inner.remove_checksums(record_ids).await
    }
}

/// `n` distinct records with ids `1..=n`.
pub fn records(n: i64) -> Vec<SourceRecord> {
    (1..=n)
        .map(|i| SourceRecord::new(i, format!("Product number {}", i)))
        .collect()
}
