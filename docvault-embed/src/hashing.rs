//! Deterministic feature-hashing embeddings.
//!
//! Each lowercase alphanumeric token is hashed with FNV into one of
//! `dimension` buckets and added with a sign taken from a second hash bit,
//! then the vector is L2-normalized. Texts sharing vocabulary land close
//! together, which is enough for tests, offline use and small corpora.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;

/// Embedding provider that needs no model files and no network.
#[derive(Debug, Clone)]
pub struct HashingEmbedProvider {
    dimension: usize,
}

impl HashingEmbedProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        Ok(Self { dimension })
    }

    /// Embed one text synchronously.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = FnvHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings: Vec<Vec<f32>> = texts.iter().map(|text| self.embed_sync(text)).collect();
        Ok(EmbeddingResult {
            embeddings,
            dimension: self.dimension,
        })
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedProvider::new(0).is_err());
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = HashingEmbedProvider::new(64).unwrap();
        let a = provider.embed_sync("Budget utilization is 92%");
        let b = provider.embed_sync("budget UTILIZATION is 92%");
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashingEmbedProvider::new(16).unwrap();
        let vector = provider.embed_sync("  ...  ");
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let provider = HashingEmbedProvider::new(256).unwrap();
        let query = provider.embed_sync("server uptime");
        let related = provider.embed_sync("server uptime was high this quarter");
        let unrelated = provider.embed_sync("budget spreadsheet attached");
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = HashingEmbedProvider::new(32).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let result = provider.embed_texts(&texts).await.unwrap();
        assert!(result.validate(2, 32).is_ok());
        assert_eq!(result.embeddings[0], provider.embed_sync("alpha"));
        assert_eq!(result.embeddings[1], provider.embed_sync("beta"));

        let empty = provider.embed_texts(&[]).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.dimension, 32);
    }
}
