//! Core data models used throughout catalog-index.
//!
//! These types represent the catalog records, stored embeddings, and search
//! results that flow through the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A catalog item or email thread as read from the source store.
///
/// Owned by the external catalog; this crate never writes it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: i64,
    pub title: String,
    /// Slug or display name. Not part of the embedding text.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    /// Lower bound of the price range, as the catalog's decimal string.
    #[serde(default)]
    pub min_price: Option<String>,
    #[serde(default)]
    pub max_price: Option<String>,
    #[serde(default)]
    pub stock_status: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    /// Comma-joined tag list, e.g. `"holster,glock,kydex"`.
    #[serde(default)]
    pub tags: Option<String>,
}

impl SourceRecord {
    /// A record with only an id and title set.
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            name: None,
            description: None,
            short_description: None,
            sku: None,
            min_price: None,
            max_price: None,
            stock_status: None,
            stock_quantity: None,
            tags: None,
        }
    }

    /// Individual tags, trimmed, with empty entries dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All free-text fields that take part in lexical matching.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(
            [
                &self.name,
                &self.description,
                &self.short_description,
                &self.sku,
                &self.tags,
            ]
            .into_iter()
            .filter_map(|f| f.as_deref()),
        )
    }
}

/// Stored fingerprint for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub record_id: i64,
    pub fingerprint: String,
    /// Unix timestamp of the last successful refresh.
    pub checked_at: i64,
}

/// A persisted embedding with a denormalized copy of its source record.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub record_id: i64,
    pub vector: Vec<f32>,
    pub record: SourceRecord,
    /// Identifier of the model that produced `vector`.
    pub model: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmbeddingRecord {
    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub record: SourceRecord,
    /// Raw cosine similarity in `[-1.0, 1.0]`.
    pub similarity: f32,
    /// Heuristic bonus added to `similarity`, if any was earned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
    /// `similarity + boost`, the ranking key.
    pub score: f32,
}

/// Result of a search request.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchOutcome {
    pub results: Vec<SearchHit>,
    /// True when the required-token filter would have removed every
    /// candidate and the unfiltered similarity ranking was returned.
    pub fallback: bool,
}
