//! Bounded heuristic boosting.
//!
//! A boost is a small additive bonus on top of cosine similarity, earned
//! by lexical agreement between the query and a record:
//!
//! - the whole query phrase appears in the title (`title_phrase_bonus`);
//! - each (synonym-expanded) query token found among the title or tag
//!   tokens (`token_bonus` apiece);
//! - configured [`BoostRule`]s whose trigger token is in the query and
//!   whose term appears in the record's title or tags.
//!
//! The sum is clamped to `[0, max_boost]`, so boosting reorders near ties
//! but cannot overturn a large similarity gap.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::SourceRecord;
use crate::tokens::tokenize;

/// A data-driven keyword boost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostRule {
    /// Query token that activates the rule.
    pub query_token: String,
    /// Term looked up (case-insensitively) in the record title and tags.
    pub record_term: String,
    pub bonus: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoostConfig {
    pub title_phrase_bonus: f32,
    pub token_bonus: f32,
    pub max_boost: f32,
    pub rules: Vec<BoostRule>,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            title_phrase_bonus: 0.15,
            token_bonus: 0.03,
            max_boost: 0.3,
            rules: Vec::new(),
        }
    }
}

/// Per-query boost inputs, computed once and applied to every candidate.
pub struct QueryBoost<'a> {
    config: &'a BoostConfig,
    phrase: String,
    tokens: Vec<String>,
}

impl<'a> QueryBoost<'a> {
    /// `expanded_tokens` are the query tokens after synonym expansion.
    pub fn new(config: &'a BoostConfig, query: &str, expanded_tokens: Vec<String>) -> Self {
        let phrase = query.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            config,
            phrase: phrase.to_lowercase(),
            tokens: expanded_tokens,
        }
    }

    /// Boost earned by one record, in `[0, max_boost]`.
    pub fn score(&self, record: &SourceRecord) -> f32 {
        let title = record.title.to_lowercase();
        let mut bonus = 0.0f32;

        if !self.phrase.is_empty() && title.contains(&self.phrase) {
            bonus += self.config.title_phrase_bonus;
        }

        let tags = record.tags.as_deref().unwrap_or("").to_lowercase();
        let mut matchable: HashSet<String> = tokenize(&title).into_iter().collect();
        matchable.extend(tokenize(&tags));

        let matched = self.tokens.iter().filter(|t| matchable.contains(*t)).count();
        bonus += matched as f32 * self.config.token_bonus;

        for rule in &self.config.rules {
            let trigger = rule.query_token.trim().to_lowercase();
            let term = rule.record_term.trim().to_lowercase();
            if term.is_empty() || !self.tokens.contains(&trigger) {
                continue;
            }
            if title.contains(&term) || tags.contains(&term) {
                bonus += rule.bonus;
            }
        }

        bonus.clamp(0.0, self.config.max_boost.max(0.0))
    }
}
