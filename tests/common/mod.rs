//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use catalog_index_core::embedding::{ChatMessage, ModelProvider};
use catalog_index_core::tokens::tokenize;

pub const DIMS: usize = 32;

/// Deterministic bag-of-words embeddings over hashed token buckets.
pub struct BagOfWords;

impl BagOfWords {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for token in tokenize(text) {
            let h = token
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
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
        "bow-32"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String], _timeout: Duration) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
    async fn complete(&self, messages: &[ChatMessage], _timeout: Duration) -> Result<String> {
        Ok(format!("answered from {} messages", messages.len()))
    }
}

pub async fn open_pool(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .unwrap()
}

/// Columns are loosely typed on purpose: real catalogs store prices as
/// REAL and leave optional text blank.
pub async fn create_catalog(pool: &SqlitePool) {
    sqlx::query(
        r#"
        CREATE TABLE catalog_records (
            id INTEGER PRIMARY KEY,
            title TEXT,
            name TEXT,
            description TEXT,
            short_description TEXT,
            sku TEXT,
            min_price REAL,
            max_price REAL,
            stock_status TEXT,
            stock_quantity INTEGER,
            tags TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
}

pub async fn insert_product(
    pool: &SqlitePool,
    id: i64,
    title: &str,
    description: &str,
    tags: &str,
    price: f64,
) {
    sqlx::query(
        r#"
        INSERT INTO catalog_records
            (id, title, name, description, short_description, sku, min_price, max_price,
             stock_status, stock_quantity, tags)
        VALUES (?, ?, NULL, ?, '', ?, ?, ?, 'instock', 5, ?)
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(format!("SKU-{}", id))
    .bind(price)
    .bind(price)
    .bind(tags)
    .execute(pool)
    .await
    .unwrap();
}

/// The three-product catalog used across tests.
pub async fn seed_holsters(pool: &SqlitePool) {
    create_catalog(pool).await;
    insert_product(
        pool,
        1,
        "Glock 19 Holster",
        "<p>Kydex <b>IWB</b> holster</p>",
        "glock, kydex, iwb",
        39.99,
    )
    .await;
    insert_product(
        pool,
        2,
        "Fobus Paddle Holster",
        "Polymer paddle holster",
        "fobus, paddle",
        29.5,
    )
    .await;
    insert_product(
        pool,
        3,
        "Leather Belt",
        "Full grain leather gun belt",
        "belt, leather",
        45.0,
    )
    .await;
}
