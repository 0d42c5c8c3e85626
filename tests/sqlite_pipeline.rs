//! End-to-end indexing and search over the SQLite catalog and stores.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use catalog_index::corpus::SqliteCorpus;
use catalog_index::migrate;
use catalog_index::sqlite_store::SqliteStore;
use catalog_index_core::embedding::vec_to_blob;
use catalog_index_core::indexer::{run_index, IndexOptions};
use catalog_index_core::models::SourceRecord;
use catalog_index_core::search::{SearchEngine, SearchParams};
use catalog_index_core::store::{ChecksumStore, CorpusReader, VectorStore};
use catalog_index_core::tokens::{SynonymTable, TokenVocabulary};

use common::{open_pool, seed_holsters, BagOfWords};

struct Fixture {
    _tmp: TempDir,
    catalog: sqlx::SqlitePool,
    corpus: SqliteCorpus,
    store: Arc<SqliteStore>,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let catalog = open_pool(&tmp.path().join("catalog.sqlite")).await;
    seed_holsters(&catalog).await;

    let index = open_pool(&tmp.path().join("index.sqlite")).await;
    migrate::apply(&index).await.unwrap();
    // Idempotent.
    migrate::apply(&index).await.unwrap();

    Fixture {
        _tmp: tmp,
        corpus: SqliteCorpus::new(catalog.clone(), "catalog_records").unwrap(),
        catalog,
        store: Arc::new(SqliteStore::new(index)),
    }
}

async fn index(f: &Fixture) -> catalog_index_core::indexer::IndexReport {
    run_index(
        &f.corpus,
        f.store.as_ref(),
        f.store.as_ref(),
        &BagOfWords,
        &IndexOptions {
            batch_size: 2,
            ..IndexOptions::default()
        },
    )
    .await
    .unwrap()
}

fn engine(f: &Fixture, vocabulary: TokenVocabulary) -> SearchEngine {
    SearchEngine::new(
        Arc::new(BagOfWords),
        f.store.clone(),
        vocabulary,
        SynonymTable::default(),
        SearchParams::default(),
    )
}

#[tokio::test]
async fn test_corpus_converts_optional_columns() {
    let f = fixture().await;
    let records = f.corpus.read_all().await.unwrap();
    assert_eq!(records.len(), 3);

    let glock = &records[0];
    assert_eq!(glock.id, 1);
    assert_eq!(glock.name, None);
    // Blank strings become None.
    assert_eq!(glock.short_description, None);
    assert_eq!(glock.sku.as_deref(), Some("SKU-1"));
    assert_eq!(glock.min_price.as_deref(), Some("39.99"));
    assert_eq!(glock.stock_quantity, Some(5));
    assert_eq!(glock.tag_list(), vec!["glock", "kydex", "iwb"]);
    assert_eq!(f.corpus.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_corpus_rejects_unsafe_table_name() {
    let pool = sqlx::SqlitePool::connect_lazy("sqlite::memory:").unwrap();
    assert!(SqliteCorpus::new(pool, "records; DROP TABLE x").is_err());
}

#[tokio::test]
async fn test_index_then_reindex_is_noop() {
    let f = fixture().await;

    let first = index(&f).await;
    assert_eq!(first.scanned, 3);
    assert_eq!(first.embedded, 3);
    assert_eq!(first.provider_calls, 2);
    assert_eq!(f.store.count().await.unwrap(), 3);
    assert_eq!(f.store.load_checksums().await.unwrap().len(), 3);

    let second = index(&f).await;
    assert_eq!(second.changed, 0);
    assert_eq!(second.provider_calls, 0);
}

#[tokio::test]
async fn test_catalog_edit_reembeds_and_keeps_created_at() {
    let f = fixture().await;
    index(&f).await;
    let before = f.store.get(2).await.unwrap().unwrap();

    sqlx::query("UPDATE catalog_records SET title = 'Fobus Paddle Holster Gen 5' WHERE id = 2")
        .execute(&f.catalog)
        .await
        .unwrap();
    // Stock quantity is not embedded; changing it must not trigger work.
    sqlx::query("UPDATE catalog_records SET stock_quantity = 0 WHERE id = 3")
        .execute(&f.catalog)
        .await
        .unwrap();

    let report = index(&f).await;
    assert_eq!(report.changed, 1);
    assert_eq!(report.embedded, 1);

    let after = f.store.get(2).await.unwrap().unwrap();
    assert_eq!(after.record.title, "Fobus Paddle Holster Gen 5");
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(after.model, "bow-32");
    assert_eq!(after.dims(), common::DIMS);
}

#[tokio::test]
async fn test_search_filters_and_falls_back() {
    let f = fixture().await;
    index(&f).await;
    let records = f.corpus.read_all().await.unwrap();
    let engine = engine(&f, TokenVocabulary::from_records(&records));

    let outcome = engine.search("Glock 19", 10).await.unwrap();
    let ids: Vec<i64> = outcome.results.iter().map(|h| h.record.id).collect();
    assert_eq!(ids, vec![1]);
    assert!(!outcome.fallback);
    assert!(outcome.results[0].boost.is_some());

    let outcome = engine.search("Glock 45", 10).await.unwrap();
    assert!(outcome.fallback);
    assert_eq!(outcome.results.len(), 3);

    let outcome = engine.search("something to carry it in", 2).await.unwrap();
    assert!(!outcome.fallback);
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results[0].score >= outcome.results[1].score);
}

#[tokio::test]
async fn test_malformed_rows_are_skipped() {
    let f = fixture().await;
    index(&f).await;

    // Truncated blob and broken metadata on two rows.
    sqlx::query("UPDATE embeddings SET embedding = ? WHERE record_id = 1")
        .bind(vec![1u8, 2, 3])
        .execute(f.store.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE embeddings SET metadata_json = '{not json' WHERE record_id = 2")
        .execute(f.store.pool())
        .await
        .unwrap();

    let neighbors = f.store.nearest(&BagOfWords::vector("holster"), 10).await.unwrap();
    let ids: Vec<i64> = neighbors.iter().map(|n| n.record.record_id).collect();
    assert_eq!(ids, vec![3]);
    assert!(f.store.get(1).await.is_err());
}

#[tokio::test]
async fn test_mistyped_rows_are_skipped() {
    let f = fixture().await;
    index(&f).await;

    // Wrong storage classes: an INTEGER vector and BLOB metadata.
    sqlx::query("UPDATE embeddings SET embedding = 42 WHERE record_id = 1")
        .execute(f.store.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE embeddings SET metadata_json = x'7b7d' WHERE record_id = 2")
        .execute(f.store.pool())
        .await
        .unwrap();

    let neighbors = f.store.nearest(&BagOfWords::vector("holster"), 10).await.unwrap();
    let ids: Vec<i64> = neighbors.iter().map(|n| n.record.record_id).collect();
    assert_eq!(ids, vec![3]);
    assert!(f.store.get(1).await.is_err());
    assert!(f.store.get(2).await.is_err());

    // Search degrades to the readable rows.
    let outcome = engine(&f, TokenVocabulary::default())
        .search("holster", 5)
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
}

#[tokio::test]
async fn test_loosely_typed_catalog_is_read() {
    let tmp = TempDir::new().unwrap();
    let pool = open_pool(&tmp.path().join("loose.sqlite")).await;
    // No declared types: cells keep whatever storage class was inserted.
    sqlx::query(
        "CREATE TABLE loose_catalog (id, title, name, description, short_description, sku, \
         min_price, max_price, stock_status, stock_quantity, tags)",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO loose_catalog VALUES \
         (1, 1911, NULL, 'Steel frame', '', 12345, 699, 699, 'instock', '3', 'pistol'), \
         (2, 'Mag Pouch', 'mag-pouch', NULL, NULL, 'MP-2', '19.5', NULL, 'instock', 7, 'pouch'), \
         ('x-7', 'Broken', NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let corpus = SqliteCorpus::new(pool.clone(), "loose_catalog").unwrap();
    let records = corpus.read_all().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].title, "1911");
    assert_eq!(records[0].sku.as_deref(), Some("12345"));
    assert_eq!(records[0].min_price.as_deref(), Some("699"));
    assert_eq!(records[0].stock_quantity, Some(3));
    assert_eq!(records[1].min_price.as_deref(), Some("19.5"));

    let index = open_pool(&tmp.path().join("index.sqlite")).await;
    migrate::apply(&index).await.unwrap();
    let store = SqliteStore::new(index);
    let report = run_index(&corpus, &store, &store, &BagOfWords, &IndexOptions::default())
        .await
        .unwrap();
    assert_eq!(report.embedded, 2);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_delisted_products_are_removed() {
    let f = fixture().await;
    index(&f).await;

    sqlx::query("DELETE FROM catalog_records WHERE id = 3")
        .execute(&f.catalog)
        .await
        .unwrap();

    let report = index(&f).await;
    assert_eq!(report.pruned, 1);
    assert_eq!(report.provider_calls, 0);
    assert!(f.store.get(3).await.unwrap().is_none());
    let mut ids = f.store.record_ids().await.unwrap();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
    assert!(!f.store.load_checksums().await.unwrap().contains_key(&3));
}

#[tokio::test]
async fn test_nearest_ranks_with_id_tiebreak() {
    let f = fixture().await;
    let a = SourceRecord::new(10, "a");
    let b = SourceRecord::new(11, "b");
    let c = SourceRecord::new(12, "c");
    f.store.upsert(&[0.0, 1.0], &b, "m").await.unwrap();
    f.store.upsert(&[0.0, 1.0], &a, "m").await.unwrap();
    f.store.upsert(&[1.0, 0.0], &c, "m").await.unwrap();
    // Wrong dimension: similarity 0, never an error.
    sqlx::query(
        "INSERT INTO embeddings (record_id, model, dims, embedding, metadata_json, created_at, updated_at) VALUES (13, 'm', 3, ?, ?, 0, 0)",
    )
    .bind(vec_to_blob(&[1.0, 0.0, 0.0]))
    .bind(serde_json::to_string(&SourceRecord::new(13, "d")).unwrap())
    .execute(f.store.pool())
    .await
    .unwrap();

    let hits = f.store.nearest(&[0.0, 1.0], 4).await.unwrap();
    let ids: Vec<i64> = hits.iter().map(|n| n.record.record_id).collect();
    assert_eq!(ids, vec![10, 11, 12, 13]);
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    assert!(hits[0].distance().abs() < 1e-6);
}

#[tokio::test]
async fn test_checksum_store_roundtrip() {
    let f = fixture().await;
    f.store.put_checksum(1, "aaa").await.unwrap();
    f.store.put_checksum(1, "bbb").await.unwrap();
    f.store.put_checksum(2, "ccc").await.unwrap();
    let sums = f.store.load_checksums().await.unwrap();
    assert_eq!(sums.len(), 2);
    assert_eq!(sums[&1], "bbb");

    f.store.clear_checksums().await.unwrap();
    assert!(f.store.load_checksums().await.unwrap().is_empty());
}
