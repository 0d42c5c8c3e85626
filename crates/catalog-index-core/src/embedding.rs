//! Model provider trait and vector utilities.
//!
//! Defines the [`ModelProvider`] trait that every embedding/completion
//! backend implements, plus pure helper functions for vector
//! serialization and similarity computation.
//!
//! Concrete HTTP and local providers live in the `catalog-index` app
//! crate; the failover wrapper lives in [`crate::provider`].

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single chat message for [`ModelProvider::complete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Vectors from one embedding call, labeled with the model that
/// actually produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub model: String,
    /// Declared dimensionality of `model`, or 0 if unknown.
    pub dims: usize,
}

/// An embedding and text-completion backend.
///
/// Every call carries its own timeout; a timeout is reported as an
/// ordinary error.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short label used in logs (e.g. `"openai"`, `"azure"`).
    fn name(&self) -> &str;

    /// Embedding model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding dimensionality, or 0 if not declared.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>>;

    /// Like [`embed`](Self::embed), also naming the serving model.
    ///
    /// Wrappers that may route a call to another backend override this.
    async fn embed_labeled(&self, texts: &[String], timeout: Duration) -> Result<Embeddings> {
        let vectors = self.embed(texts, timeout).await?;
        Ok(Embeddings {
            vectors,
            model: self.model_name().to_string(),
            dims: self.dims(),
        })
    }

    /// Produce a completion for a chat transcript.
    async fn complete(&self, messages: &[ChatMessage], timeout: Duration) -> Result<String>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Returns `None` for blobs that cannot be a stored vector: empty, a
/// length that is not a multiple of 4, or any non-finite component.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return None;
    }
    let vec: Vec<f32> = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if vec.iter().all(|v| v.is_finite()) {
        Some(vec)
    } else {
        None
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors,
/// vectors of different lengths, or when either vector has zero norm.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON || !denom.is_finite() {
        return 0.0;
    }

    ((dot / denom) as f32).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), Some(vec));
    }

    #[test]
    fn test_blob_malformed() {
        assert_eq!(blob_to_vec(&[]), None);
        assert_eq!(blob_to_vec(&[0, 0, 128]), None);
        assert_eq!(blob_to_vec(&vec_to_blob(&[1.0, f32::NAN])), None);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_bounded_for_assorted_pairs() {
        let vectors: Vec<Vec<f32>> = vec![
            vec![1e-3, 2e-3, -5e-4],
            vec![1e6, -3e5, 2.0],
            vec![-1.0, -1.0, -1.0],
            vec![0.3, 0.3, 0.3],
            vec![f32::MAX / 4.0, 1.0, -1.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let sim = cosine_similarity(a, b);
                assert!((-1.0..=1.0).contains(&sim), "out of range: {}", sim);
            }
            assert!((cosine_similarity(a, a) - 1.0).abs() < 1e-4);
        }
    }
}
