//! Concrete model providers.
//!
//! - **[`HttpProvider`]** speaks the OpenAI wire format, either against
//!   an OpenAI-compatible base URL or against Azure OpenAI deployments.
//! - **[`LocalProvider`]** runs a fastembed model in-process (feature
//!   `local-embeddings-fastembed`); embedding only.
//!
//! [`create_client`] builds the primary and optional secondary provider
//! from configuration and wraps them in a [`FailoverClient`].
//!
//! Providers make exactly one HTTP attempt per call. Failover to the
//! secondary is the only retry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use catalog_index_core::embedding::{ChatMessage, ModelProvider};
use catalog_index_core::provider::FailoverClient;

use crate::config::{Config, ProviderConfig};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Failures specific to the OpenAI wire protocol.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("{provider} API error {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("invalid {provider} response: {reason}")]
    Malformed { provider: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    OpenAi,
    Azure,
}

/// OpenAI-compatible embeddings and chat completions over HTTP.
pub struct HttpProvider {
    label: String,
    flavor: Flavor,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    chat_model: Option<String>,
    dims: usize,
    api_version: String,
}

impl HttpProvider {
    /// Build from config, reading the API key from `api_key_env`.
    pub fn new(label: &str, config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::with_api_key(label, config, api_key)
    }

    pub fn with_api_key(label: &str, config: &ProviderConfig, api_key: String) -> Result<Self> {
        let flavor = match config.kind.as_str() {
            "openai" => Flavor::OpenAi,
            "azure" => Flavor::Azure,
            other => bail!("'{}' is not an HTTP provider kind", other),
        };
        let base_url = match (&config.base_url, flavor) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Flavor::OpenAi) => OPENAI_BASE_URL.to_string(),
            (None, Flavor::Azure) => bail!("base_url required for azure provider"),
        };

        Ok(Self {
            label: label.to_string(),
            flavor,
            client: reqwest::Client::builder().build()?,
            base_url,
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            dims: config.dims,
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        })
    }

    /// Endpoint URL for `operation` (`embeddings` or `chat/completions`)
    /// against `model`, which is a deployment name on Azure.
    fn endpoint(&self, operation: &str, model: &str) -> String {
        match self.flavor {
            Flavor::OpenAi => format!("{}/{}", self.base_url, operation),
            Flavor::Azure => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                self.base_url, model, operation, self.api_version
            ),
        }
    }

    async fn post(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let request = self.client.post(url).timeout(timeout).json(body);
        let request = match self.flavor {
            Flavor::OpenAi => request.bearer_auth(&self.api_key),
            Flavor::Azure => request.header("api-key", &self.api_key),
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("{} request to {} failed", self.label, url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WireError::Status {
                provider: self.label.clone(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ModelProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let url = self.endpoint("embeddings", &self.embedding_model);
        let json = self.post(&url, &body, timeout).await?;
        Ok(parse_embeddings(&self.label, &json, texts.len())?)
    }

    async fn complete(&self, messages: &[ChatMessage], timeout: Duration) -> Result<String> {
        let model = self
            .chat_model
            .as_deref()
            .ok_or_else(|| anyhow!("{}: chat_model not configured", self.label))?;
        let body = json!({
            "model": model,
            "messages": messages,
        });
        let url = self.endpoint("chat/completions", model);
        let json = self.post(&url, &body, timeout).await?;
        Ok(parse_completion(&self.label, &json)?)
    }
}

fn malformed(provider: &str, reason: impl Into<String>) -> WireError {
    WireError::Malformed {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
///
/// Fails unless there is exactly one vector per input and every index
/// in `0..expected` appears once.
pub fn parse_embeddings(
    provider: &str,
    json: &Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, WireError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| malformed(provider, "missing data array"))?;

    if data.len() != expected {
        return Err(malformed(
            provider,
            format!("expected {} embeddings, got {}", expected, data.len()),
        ));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, item) in data.iter().enumerate() {
        let index = match item.get("index") {
            Some(v) => v
                .as_u64()
                .map(|i| i as usize)
                .ok_or_else(|| malformed(provider, "non-integer index"))?,
            None => position,
        };
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| malformed(provider, "missing embedding"))?;
        let vector = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| malformed(provider, "non-numeric embedding value"))?;

        let slot = slots
            .get_mut(index)
            .ok_or_else(|| malformed(provider, format!("index {} out of range", index)))?;
        if slot.is_some() {
            return Err(malformed(provider, format!("duplicate index {}", index)));
        }
        *slot = Some(vector);
    }

    slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| malformed(provider, "missing index"))
}

/// Extract `choices[0].message.content`.
pub fn parse_completion(provider: &str, json: &Value) -> Result<String, WireError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| malformed(provider, "missing choices[0].message.content"))
}

// ============ Local Provider (fastembed) ============

/// In-process embeddings via fastembed. The model is loaded on first use.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    label: String,
    model_name: String,
    dims: usize,
    model: fastembed::EmbeddingModel,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(label: &str, config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            label: label.to_string(),
            model_name: config.embedding_model.clone(),
            dims: config.dims,
            model: fastembed_model(&config.embedding_model)?,
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!("Unknown local embedding model: '{}'", other),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl ModelProvider for LocalProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();

        let work = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = loaded
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let embedder = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(embedder);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model unavailable"))?;
            embedder
                .embed(texts, None)
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        });

        tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| anyhow!("{}: embedding timed out after {:?}", self.label, timeout))??
    }

    async fn complete(&self, _messages: &[ChatMessage], _timeout: Duration) -> Result<String> {
        bail!("{}: local provider does not support completions", self.label)
    }
}

fn build_provider(label: &str, config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
    match config.kind.as_str() {
        "openai" | "azure" => Ok(Arc::new(HttpProvider::new(label, config)?)),
        "local" => {
            #[cfg(feature = "local-embeddings-fastembed")]
            {
                Ok(Arc::new(LocalProvider::new(label, config)?))
            }
            #[cfg(not(feature = "local-embeddings-fastembed"))]
            {
                bail!("Local provider requires --features local-embeddings-fastembed")
            }
        }
        other => bail!("Unknown provider kind: '{}'", other),
    }
}

/// Build the failover client described by `[provider]`.
pub fn create_client(config: &Config) -> Result<FailoverClient> {
    let primary = build_provider("primary", &config.provider.primary)
        .context("Failed to configure primary provider")?;
    let secondary = match &config.provider.secondary {
        Some(secondary) => Some(
            build_provider("secondary", secondary)
                .context("Failed to configure secondary provider")?,
        ),
        None => None,
    };
    Ok(FailoverClient::new(primary, secondary))
}
