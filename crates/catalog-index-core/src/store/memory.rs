//! In-memory store implementations for testing and embedded use.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Nearest
//! neighbour search is brute-force cosine similarity over every stored
//! vector with bounded top-K selection.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Checksum, EmbeddingRecord, SourceRecord};

use super::{top_k, ChecksumStore, CorpusReader, Neighbor, VectorStore};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// In-memory vector and checksum store.
pub struct InMemoryStore {
    vectors: RwLock<HashMap<i64, EmbeddingRecord>>,
    checksums: RwLock<HashMap<i64, Checksum>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            checksums: RwLock::new(HashMap::new()),
        }
    }

    /// Full checksum rows, including `checked_at`.
    pub fn checksum(&self, record_id: i64) -> Option<Checksum> {
        self.checksums
            .read()
            .ok()
            .and_then(|c| c.get(&record_id).cloned())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, vector: &[f32], record: &SourceRecord, model: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut vectors = write(&self.vectors)?;
        let created_at = vectors
            .get(&record.id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        vectors.insert(
            record.id,
            EmbeddingRecord {
                record_id: record.id,
                vector: vector.to_vec(),
                record: record.clone(),
                model: model.to_string(),
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get(&self, record_id: i64) -> Result<Option<EmbeddingRecord>> {
        Ok(read(&self.vectors)?.get(&record_id).cloned())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let vectors = read(&self.vectors)?;
        let scored = vectors
            .values()
            .map(|rec| (cosine_similarity(query, &rec.vector), rec.record_id, rec));

        Ok(top_k(scored, k)
            .into_iter()
            .map(|(similarity, _, rec)| Neighbor {
                record: rec.clone(),
                similarity,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(read(&self.vectors)?.len())
    }

    async fn record_ids(&self) -> Result<Vec<i64>> {
        Ok(read(&self.vectors)?.keys().copied().collect())
    }

    async fn remove(&self, record_ids: &[i64]) -> Result<usize> {
        let mut vectors = write(&self.vectors)?;
        let mut removed = 0;
        for id in record_ids {
            if vectors.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ChecksumStore for InMemoryStore {
    async fn load_checksums(&self) -> Result<HashMap<i64, String>> {
        Ok(read(&self.checksums)?
            .values()
            .map(|c| (c.record_id, c.fingerprint.clone()))
            .collect())
    }

    async fn put_checksum(&self, record_id: i64, fingerprint: &str) -> Result<()> {
        write(&self.checksums)?.insert(
            record_id,
            Checksum {
                record_id,
                fingerprint: fingerprint.to_string(),
                checked_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn clear_checksums(&self) -> Result<()> {
        write(&self.checksums)?.clear();
        Ok(())
    }

    async fn remove_checksums(&self, record_ids: &[i64]) -> Result<()> {
        let mut checksums = write(&self.checksums)?;
        for id in record_ids {
            checksums.remove(id);
        }
        Ok(())
    }
}

/// A mutable in-memory catalog, standing in for the external source store.
#[derive(Default)]
pub struct InMemoryCorpus {
    records: RwLock<Vec<SourceRecord>>,
}

impl InMemoryCorpus {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Insert or replace a record, simulating an external catalog edit.
    pub fn put(&self, record: SourceRecord) -> Result<()> {
        let mut records = write(&self.records)?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
        Ok(())
    }

    /// Drop a record, simulating a product being delisted.
    pub fn remove(&self, record_id: i64) -> Result<()> {
        write(&self.records)?.retain(|r| r.id != record_id);
        Ok(())
    }
}

#[async_trait]
impl CorpusReader for InMemoryCorpus {
    async fn read_all(&self) -> Result<Vec<SourceRecord>> {
        Ok(read(&self.records)?.clone())
    }
}
