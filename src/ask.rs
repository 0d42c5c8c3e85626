//! `cidx ask`: retrieval-grounded answer from the completion model.

use anyhow::Result;

use catalog_index_core::embedding::ChatMessage;
use catalog_index_core::models::SearchHit;

use crate::config::Config;
use crate::search::{open_engine, search};

const SYSTEM_PROMPT: &str = "You are a customer support assistant for an online shop. \
Answer using only the products listed in the context. If none of them fit, say so.";

/// One context line per hit: title, SKU, price, stock and a short summary.
pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let r = &hit.record;
            let mut line = format!("{}. {} (id {})", i + 1, r.title, r.id);
            if let Some(sku) = &r.sku {
                line.push_str(&format!(", SKU {}", sku));
            }
            if let Some(price) = r.min_price.as_ref().or(r.max_price.as_ref()) {
                line.push_str(&format!(", ${}", price));
            }
            if let Some(stock) = &r.stock_status {
                line.push_str(&format!(", {}", stock));
            }
            if let Some(short) = &r.short_description {
                line.push_str(&format!(": {}", short));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_messages(question: &str, hits: &[SearchHit]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            format_context(hits),
            question
        )),
    ]
}

pub async fn run_ask(config: &Config, question: &str, limit: Option<usize>) -> Result<()> {
    let (engine, pool) = open_engine(config).await?;
    let limit = limit.unwrap_or(config.retrieval.final_limit);

    let answer = async {
        let outcome = search(&engine, question, limit).await?;
        let messages = build_messages(question, &outcome.results);
        let answer = engine
            .provider()
            .complete(&messages, config.completion_timeout())
            .await?;
        anyhow::Ok((answer, outcome))
    }
    .await;
    pool.close().await;
    let (answer, outcome) = answer?;

    println!("{}", answer.trim());
    if !outcome.results.is_empty() {
        println!();
        println!("Sources:");
        for hit in &outcome.results {
            println!("  - {} (id {})", hit.record.title, hit.record.id);
        }
    }
    Ok(())
}
