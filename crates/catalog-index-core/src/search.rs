//! Query pipeline: embed, over-fetch, filter, boost, rank.
//!
//! ```text
//! query ──► provider.embed ──► VectorStore::nearest(k) ──► required-token filter
//!                                                               │ (fallback if empty)
//!                         truncate(limit) ◄── rank ◄── QueryBoost
//! ```
//!
//! The candidate pool is deliberately larger than `limit` so that the
//! lexical filter still has something to choose from: `k =
//! max(limit * candidate_multiplier, candidate_floor)`.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::boost::{BoostConfig, QueryBoost};
use crate::embedding::ModelProvider;
use crate::error::{SearchError, SearchResult};
use crate::models::{SearchHit, SearchOutcome};
use crate::store::{Neighbor, VectorStore};
use crate::tokens::{record_tokens, required_tokens, tokenize, SynonymTable, TokenVocabulary};

/// Retrieval tuning.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub candidate_multiplier: usize,
    pub candidate_floor: usize,
    pub query_timeout: Duration,
    pub boost: BoostConfig,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            candidate_multiplier: 3,
            candidate_floor: 30,
            query_timeout: Duration::from_secs(10),
            boost: BoostConfig::default(),
        }
    }
}

impl SearchParams {
    /// Number of nearest neighbours fetched for a request of `limit`.
    pub fn candidate_count(&self, limit: usize) -> usize {
        limit
            .saturating_mul(self.candidate_multiplier)
            .max(self.candidate_floor)
            .max(limit)
    }
}

/// Read-only search over a [`VectorStore`].
///
/// `SearchEngine` is `Send + Sync`; share it behind an `Arc` and call
/// [`search`](Self::search) concurrently.
pub struct SearchEngine {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn VectorStore>,
    vocabulary: RwLock<Arc<TokenVocabulary>>,
    synonyms: SynonymTable,
    params: SearchParams,
}

impl SearchEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn VectorStore>,
        vocabulary: TokenVocabulary,
        synonyms: SynonymTable,
        params: SearchParams,
    ) -> Self {
        Self {
            provider,
            store,
            vocabulary: RwLock::new(Arc::new(vocabulary)),
            synonyms,
            params,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Current vocabulary snapshot.
    pub fn vocabulary(&self) -> Arc<TokenVocabulary> {
        match self.vocabulary.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the vocabulary. In-flight searches keep the snapshot they
    /// started with.
    pub fn reload_vocabulary(&self, vocabulary: TokenVocabulary) {
        let fresh = Arc::new(vocabulary);
        match self.vocabulary.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
    }

    /// Rank stored records against `query` and return at most `limit`.
    ///
    /// A blank query or a zero limit yields an empty outcome without
    /// touching the provider.
    pub async fn search(&self, query: &str, limit: usize) -> SearchResult<SearchOutcome> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(SearchOutcome::default());
        }

        let vectors = self
            .provider
            .embed(&[query.to_string()], self.params.query_timeout)
            .await
            .map_err(SearchError::Provider)?;
        let query_vec = vectors
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(SearchError::EmptyEmbedding)?;

        let k = self.params.candidate_count(limit);
        let neighbors = self
            .store
            .nearest(&query_vec, k)
            .await
            .map_err(SearchError::Store)?;
        let fetched = neighbors.len();

        let required = required_tokens(query, &self.vocabulary());
        let (candidates, fallback) = filter_required(neighbors, &required);

        let expanded = self.synonyms.expand(&tokenize(query));
        let booster = QueryBoost::new(&self.params.boost, query, expanded);
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .map(|n| {
                let bonus = booster.score(&n.record.record);
                SearchHit {
                    record: n.record.record,
                    similarity: n.similarity,
                    boost: (bonus > 0.0).then_some(bonus),
                    score: n.similarity + bonus,
                }
            })
            .collect();

        rank(&mut hits);
        hits.truncate(limit);

        debug!(
            k,
            fetched,
            required = ?required,
            fallback,
            returned = hits.len(),
            "search complete"
        );
        Ok(SearchOutcome {
            results: hits,
            fallback,
        })
    }
}

/// Keep candidates containing every required token.
///
/// Returns the input unchanged with `fallback = true` when nothing
/// survives, and unchanged with `fallback = false` when there is nothing
/// to require.
pub fn filter_required(candidates: Vec<Neighbor>, required: &[String]) -> (Vec<Neighbor>, bool) {
    if required.is_empty() {
        return (candidates, false);
    }

    let keep: Vec<bool> = candidates
        .iter()
        .map(|n| {
            let tokens = record_tokens(&n.record.record);
            required.iter().all(|t| tokens.contains(t))
        })
        .collect();

    if !keep.iter().any(|k| *k) {
        return (candidates, true);
    }

    let filtered = candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(n, k)| k.then_some(n))
        .collect();
    (filtered, false)
}

/// Adjusted score descending, record id ascending.
pub fn rank(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}
