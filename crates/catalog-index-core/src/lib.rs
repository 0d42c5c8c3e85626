//! # Catalog Index Core
//!
//! Storage-agnostic logic for catalog-index: record models, change
//! fingerprints, tokenization and boosting, store traits with an
//! in-memory backend, the provider failover client, the incremental
//! batch embedder and the search engine.
//!
//! This crate has no sqlx, reqwest, filesystem I/O or runtime
//! dependencies. Concrete SQLite stores and HTTP providers live in the
//! `catalog-index` application crate.

pub mod boost;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod indexer;
pub mod models;
pub mod provider;
pub mod search;
pub mod store;
pub mod tokens;

#[cfg(test)]
pub(crate) mod test_support;
