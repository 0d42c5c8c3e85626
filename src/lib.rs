//! # catalog-index
//!
//! Incremental embedding index and similarity search over an e-commerce
//! product catalog, backing a support chatbot's product lookup.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐
//! │   Catalog    │──▶│ Batch        │──▶│  Index SQLite  │
//! │ (read-only)  │   │ Embedder     │   │ vectors+sums   │
//! └──────────────┘   └──────┬───────┘   └───────┬────────┘
//!                           │                   │
//!                    ┌──────▼───────┐   ┌───────▼────────┐
//!                    │  Failover    │◀──│ Search Engine  │
//!                    │  Providers   │   │ filter + boost │
//!                    └──────────────┘   └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cidx init                        # create index tables
//! cidx index                       # embed new and changed records
//! cidx search "glock 19 holster"   # ranked results
//! cidx ask "do you have a kydex holster for a glock 19?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Index and catalog connections |
//! | [`migrate`] | Index schema |
//! | [`corpus`] | Catalog reader |
//! | [`sqlite_store`] | Vector and checksum stores |
//! | [`embedding`] | HTTP and local model providers |
//! | [`index_cmd`] | `cidx index` |
//! | [`search`] | `cidx search` |
//! | [`get`] | `cidx get` |
//! | [`stats`] | `cidx stats` |
//! | [`ask`] | `cidx ask` |
//!
//! Storage-agnostic logic lives in the `catalog-index-core` crate.

pub mod ask;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod get;
pub mod index_cmd;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
