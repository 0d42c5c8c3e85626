use anyhow::{Context, Result};
use catalog_index_core::boost::{BoostConfig, BoostRule};
use catalog_index_core::indexer::IndexOptions;
use catalog_index_core::search::SearchParams;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub catalog: CatalogConfig,
    pub provider: ProviderSection,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "catalog_records".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderSection {
    pub primary: ProviderConfig,
    #[serde(default)]
    pub secondary: Option<ProviderConfig>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_query_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// `openai`, `azure` or `local`.
    pub kind: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub embedding_model: String,
    #[serde(default)]
    pub chat_model: Option<String>,
    pub dims: usize,
    /// Azure only.
    #[serde(default)]
    pub api_version: Option<String>,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_description_chars")]
    pub max_description_chars: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_description_chars: default_max_description_chars(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_max_description_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_candidate_floor")]
    pub candidate_floor: usize,
    #[serde(default = "default_title_phrase_bonus")]
    pub title_phrase_bonus: f32,
    #[serde(default = "default_token_bonus")]
    pub token_bonus: f32,
    #[serde(default = "default_max_boost")]
    pub max_boost: f32,
    #[serde(default)]
    pub synonyms: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub boost_rules: Vec<BoostRule>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            candidate_multiplier: default_candidate_multiplier(),
            candidate_floor: default_candidate_floor(),
            title_phrase_bonus: default_title_phrase_bonus(),
            token_bonus: default_token_bonus(),
            max_boost: default_max_boost(),
            synonyms: HashMap::new(),
            boost_rules: Vec::new(),
        }
    }
}

fn default_final_limit() -> usize {
    10
}
fn default_candidate_multiplier() -> usize {
    3
}
fn default_candidate_floor() -> usize {
    30
}
fn default_title_phrase_bonus() -> f32 {
    0.15
}
fn default_token_bonus() -> f32 {
    0.03
}
fn default_max_boost() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            batch_size: self.indexing.batch_size,
            max_description_chars: self.indexing.max_description_chars,
            timeout: Duration::from_secs(self.provider.timeout_secs),
            ..IndexOptions::default()
        }
    }

    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            candidate_multiplier: self.retrieval.candidate_multiplier,
            candidate_floor: self.retrieval.candidate_floor,
            query_timeout: Duration::from_secs(self.provider.query_timeout_secs),
            boost: BoostConfig {
                title_phrase_bonus: self.retrieval.title_phrase_bonus,
                token_bonus: self.retrieval.token_bonus,
                max_boost: self.retrieval.max_boost,
                rules: self.retrieval.boost_rules.clone(),
            },
        }
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !is_valid_identifier(&config.catalog.table) {
        anyhow::bail!(
            "catalog.table must be a plain SQL identifier, got '{}'",
            config.catalog.table
        );
    }

    // Validate providers
    validate_provider("provider.primary", &config.provider.primary)?;
    if let Some(secondary) = &config.provider.secondary {
        validate_provider("provider.secondary", secondary)?;
        if secondary.dims != config.provider.primary.dims {
            anyhow::bail!(
                "provider.secondary.dims ({}) must equal provider.primary.dims ({})",
                secondary.dims,
                config.provider.primary.dims
            );
        }
    }
    if config.provider.timeout_secs == 0 || config.provider.query_timeout_secs == 0 {
        anyhow::bail!("provider timeouts must be > 0");
    }

    // Validate indexing
    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }

    // Validate retrieval
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.candidate_multiplier < 1 {
        anyhow::bail!("retrieval.candidate_multiplier must be >= 1");
    }
    for (name, value) in [
        ("title_phrase_bonus", config.retrieval.title_phrase_bonus),
        ("token_bonus", config.retrieval.token_bonus),
        ("max_boost", config.retrieval.max_boost),
    ] {
        if !value.is_finite() || value < 0.0 {
            anyhow::bail!("retrieval.{} must be a non-negative number", name);
        }
    }
    for rule in &config.retrieval.boost_rules {
        if rule.query_token.trim().is_empty() || rule.record_term.trim().is_empty() {
            anyhow::bail!("retrieval.boost_rules entries need query_token and record_term");
        }
    }

    if config.store.acquire_timeout_secs == 0 {
        anyhow::bail!("store.acquire_timeout_secs must be > 0");
    }

    Ok(())
}

fn validate_provider(section: &str, provider: &ProviderConfig) -> Result<()> {
    match provider.kind.as_str() {
        "openai" | "local" => {}
        "azure" => {
            if provider.base_url.is_none() {
                anyhow::bail!("{}.base_url must be specified when kind is 'azure'", section);
            }
        }
        other => anyhow::bail!(
            "Unknown provider kind in {}: '{}'. Must be openai, azure, or local.",
            section,
            other
        ),
    }
    if provider.dims == 0 {
        anyhow::bail!("{}.dims must be > 0", section);
    }
    if provider.embedding_model.trim().is_empty() {
        anyhow::bail!("{}.embedding_model must not be empty", section);
    }
    Ok(())
}

/// ASCII letters, digits and underscores, not starting with a digit.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
