//! Query and record tokenization for lexical filtering and boosting.
//!
//! Tokens are lowercase runs of alphanumeric characters. Single-letter
//! tokens are dropped unless they are digits ("9" survives, "a" does
//! not), as are stopwords.
//!
//! The **required tokens** of a query are the subset a matching record
//! must contain verbatim: anything with a digit (model numbers, sizes,
//! calibers) and anything in the catalog's [`TokenVocabulary`]. Generic
//! words are left to the vector similarity.

use std::collections::{HashMap, HashSet};

use crate::models::SourceRecord;

/// Common English function words plus shop-chat filler.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be", "buy", "by",
    "can", "do", "does", "for", "from", "get", "have", "how", "i", "if", "in", "is", "it", "looking",
    "me", "my", "need", "of", "on", "or", "please", "show", "some", "that", "the", "there", "this",
    "to", "want", "was", "what", "where", "which", "who", "will", "with", "you", "your",
];

/// Split text into normalized tokens, deduplicated in first-seen order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for raw in lowered.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        if raw.chars().count() == 1 && !raw.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if STOPWORDS.contains(&raw) {
            continue;
        }
        if seen.insert(raw.to_string()) {
            tokens.push(raw.to_string());
        }
    }

    tokens
}

/// True if the token contains at least one digit.
pub fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Immutable set of controlled-vocabulary tokens (catalog tag tokens).
///
/// Built once and handed to the search engine; replaced wholesale via
/// `SearchEngine::reload_vocabulary` rather than mutated.
#[derive(Debug, Clone, Default)]
pub struct TokenVocabulary {
    tokens: HashSet<String>,
}

impl TokenVocabulary {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .flat_map(|t| tokenize(t.as_ref()))
                .collect(),
        }
    }

    /// Collect the tokens of every tag across the given records.
    pub fn from_records(records: &[SourceRecord]) -> Self {
        Self::new(records.iter().flat_map(|r| r.tag_list()))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Tokens of `query` that a candidate must contain to pass the filter.
pub fn required_tokens(query: &str, vocabulary: &TokenVocabulary) -> Vec<String> {
    tokenize(query)
        .into_iter()
        .filter(|t| has_digit(t) || vocabulary.contains(t))
        .collect()
}

/// The token set of every textual field of a record.
pub fn record_tokens(record: &SourceRecord) -> HashSet<String> {
    record.text_fields().flat_map(tokenize).collect()
}

/// Query-token expansion table (`"holster" → ["sheath", "carrier"]`).
///
/// Keys and values are normalized through [`tokenize`] on construction so
/// lookups match query tokens directly.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    entries: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn new(raw: &HashMap<String, Vec<String>>) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for (key, values) in raw {
            for key_token in tokenize(key) {
                let slot = entries.entry(key_token).or_default();
                for value in values {
                    for v in tokenize(value) {
                        if !slot.contains(&v) {
                            slot.push(v);
                        }
                    }
                }
            }
        }
        Self { entries }
    }

    /// Append the synonyms of each token. Never removes a token; the
    /// result is deduplicated and keeps the original tokens first.
    pub fn expand(&self, tokens: &[String]) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        for t in tokens {
            if seen.insert(t.as_str()) {
                out.push(t.clone());
            }
        }
        for t in tokens {
            if let Some(syns) = self.entries.get(t) {
                for s in syns {
                    if seen.insert(s.as_str()) {
                        out.push(s.clone());
                    }
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
