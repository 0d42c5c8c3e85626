//! `cidx search`: wire the SQLite store and configured providers into a
//! [`SearchEngine`] and print ranked results.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;
use tracing::warn;

use catalog_index_core::models::{SearchOutcome, SourceRecord};
use catalog_index_core::search::SearchEngine;
use catalog_index_core::store::CorpusReader;
use catalog_index_core::tokens::{SynonymTable, TokenVocabulary};

use crate::config::Config;
use crate::corpus::SqliteCorpus;
use crate::db;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

async fn read_catalog(config: &Config) -> Result<Vec<SourceRecord>> {
    let pool = db::connect_catalog(config).await?;
    let corpus = SqliteCorpus::new(pool.clone(), &config.catalog.table)?;
    let records = corpus.read_all().await;
    pool.close().await;
    records
}

/// Catalog tag tokens, or an empty vocabulary if the catalog is unreachable.
pub async fn load_vocabulary(config: &Config) -> TokenVocabulary {
    match read_catalog(config).await {
        Ok(records) => TokenVocabulary::from_records(&records),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "catalog unavailable, searching without vocabulary");
            TokenVocabulary::default()
        }
    }
}

/// Build a search engine over the index database.
///
/// The returned pool stays owned by the engine's store; close it when done.
pub async fn open_engine(config: &Config) -> Result<(SearchEngine, SqlitePool)> {
    let client = embedding::create_client(config)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let vocabulary = load_vocabulary(config).await;

    let engine = SearchEngine::new(
        Arc::new(client),
        Arc::new(store),
        vocabulary,
        SynonymTable::new(&config.retrieval.synonyms),
        config.search_params(),
    );
    Ok((engine, pool))
}

/// Run `query` and map a search failure to a user-facing error.
pub async fn search(engine: &SearchEngine, query: &str, limit: usize) -> Result<SearchOutcome> {
    engine.search(query, limit).await.map_err(|e| {
        if e.is_retryable() {
            anyhow!("{} (temporarily unavailable, try again)", e)
        } else {
            anyhow!(e)
        }
    })
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let (engine, pool) = open_engine(config).await?;
    let limit = limit.unwrap_or(config.retrieval.final_limit);
    let outcome = search(&engine, query, limit).await;
    pool.close().await;
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    print_outcome(query, &outcome);
    Ok(())
}

fn print_outcome(query: &str, outcome: &SearchOutcome) {
    if outcome.results.is_empty() {
        println!("No results.");
        return;
    }

    println!(
        "{} result{} for \"{}\"{}",
        outcome.results.len(),
        if outcome.results.len() == 1 { "" } else { "s" },
        query,
        if outcome.fallback {
            " (no exact token match, showing closest)"
        } else {
            ""
        }
    );
    println!();

    for (i, hit) in outcome.results.iter().enumerate() {
        let r = &hit.record;
        println!("{}. [{:.3}] {}", i + 1, hit.score, r.title);
        let mut details = vec![format!("id: {}", r.id)];
        if let Some(sku) = &r.sku {
            details.push(format!("sku: {}", sku));
        }
        match (&r.min_price, &r.max_price) {
            (Some(min), Some(max)) if min != max => details.push(format!("${} - ${}", min, max)),
            (Some(p), _) | (None, Some(p)) => details.push(format!("${}", p)),
            (None, None) => {}
        }
        if let Some(stock) = &r.stock_status {
            details.push(stock.clone());
        }
        println!("    {}", details.join(" | "));
        match hit.boost {
            Some(boost) => println!(
                "    similarity: {:.3}  boost: +{:.3}",
                hit.similarity, boost
            ),
            None => println!("    similarity: {:.3}", hit.similarity),
        }
        println!();
    }
}
