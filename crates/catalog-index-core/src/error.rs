use thiserror::Error;

/// Errors that abort a search request.
///
/// Malformed stored data never surfaces here; it degrades results
/// instead.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Both providers failed to embed the query.
    #[error("query embedding failed: {0:#}")]
    Provider(anyhow::Error),

    /// The provider answered without a usable vector.
    #[error("provider returned no embedding for the query")]
    EmptyEmbedding,

    /// The vector store could not be queried.
    #[error("vector store unavailable: {0:#}")]
    Store(anyhow::Error),
}

impl SearchError {
    /// True for the "temporarily unavailable, try again" category.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Provider(_) | SearchError::Store(_))
    }
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;
