//! Primary/secondary provider failover.
//!
//! [`FailoverClient`] wraps two [`ModelProvider`]s. Each call goes to the
//! primary first; on any error it is retried exactly once against the
//! secondary (which uses its own model identifiers), if one is
//! configured. There is no backoff here: latency-sensitive callers own
//! their retry policy.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::embedding::{ChatMessage, Embeddings, ModelProvider};

/// Raised when every configured provider failed for one call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider {provider} failed: {message}")]
    Failed { provider: String, message: String },

    #[error(
        "primary provider {primary} failed: {primary_error}; \
         secondary provider {secondary} failed: {secondary_error}"
    )]
    BothFailed {
        primary: String,
        primary_error: String,
        secondary: String,
        secondary_error: String,
    },
}

/// Tries the primary provider, then the secondary once.
pub struct FailoverClient {
    primary: Arc<dyn ModelProvider>,
    secondary: Option<Arc<dyn ModelProvider>>,
}

impl FailoverClient {
    pub fn new(primary: Arc<dyn ModelProvider>, secondary: Option<Arc<dyn ModelProvider>>) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &dyn ModelProvider {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&dyn ModelProvider> {
        self.secondary.as_deref()
    }

    fn log_primary_failure(&self, op: &str, err: &anyhow::Error) {
        warn!(
            provider = self.primary.name(),
            op,
            error = %format!("{:#}", err),
            "primary provider failed"
        );
    }

    fn primary_only_failure(&self, err: anyhow::Error) -> anyhow::Error {
        ProviderError::Failed {
            provider: self.primary.name().to_string(),
            message: format!("{:#}", err),
        }
        .into()
    }

    fn both_failed(
        &self,
        secondary: &dyn ModelProvider,
        primary_err: &str,
        secondary_err: anyhow::Error,
    ) -> anyhow::Error {
        ProviderError::BothFailed {
            primary: self.primary.name().to_string(),
            primary_error: primary_err.to_string(),
            secondary: secondary.name().to_string(),
            secondary_error: format!("{:#}", secondary_err),
        }
        .into()
    }
}

#[async_trait]
impl ModelProvider for FailoverClient {
    fn name(&self) -> &str {
        "failover"
    }

    fn model_name(&self) -> &str {
        self.primary.model_name()
    }

    fn dims(&self) -> usize {
        self.primary.dims()
    }

    async fn embed(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>> {
        Ok(self.embed_labeled(texts, timeout).await?.vectors)
    }

    async fn embed_labeled(&self, texts: &[String], timeout: Duration) -> Result<Embeddings> {
        let primary_err = match self.primary.embed_labeled(texts, timeout).await {
            Ok(embeddings) => return Ok(embeddings),
            Err(e) => e,
        };
        self.log_primary_failure("embed", &primary_err);

        let secondary = match &self.secondary {
            Some(s) => s,
            None => return Err(self.primary_only_failure(primary_err)),
        };
        let primary_msg = format!("{:#}", primary_err);
        match secondary.embed_labeled(texts, timeout).await {
            Ok(embeddings) => {
                warn!(
                    provider = secondary.name(),
                    model = %embeddings.model,
                    "embed served by secondary provider"
                );
                Ok(embeddings)
            }
            Err(e) => Err(self.both_failed(secondary.as_ref(), &primary_msg, e)),
        }
    }

    async fn complete(&self, messages: &[ChatMessage], timeout: Duration) -> Result<String> {
        let primary_err = match self.primary.complete(messages, timeout).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        self.log_primary_failure("complete", &primary_err);

        let secondary = match &self.secondary {
            Some(s) => s,
            None => return Err(self.primary_only_failure(primary_err)),
        };
        let primary_msg = format!("{:#}", primary_err);
        match secondary.complete(messages, timeout).await {
            Ok(text) => Ok(text),
            Err(e) => Err(self.both_failed(secondary.as_ref(), &primary_msg, e)),
        }
    }
}
