//! Deterministic in-process embeddings using the hashing trick.
//!
//! Each lowercase alphanumeric token is hashed (FNV-1a) into one of
//! `dimensions` buckets with a hash-derived sign, and the resulting vector is
//! L2-normalized. Texts sharing vocabulary get a positive cosine similarity,
//! which is enough for offline development, tests and the in-memory store.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// An [`EmbeddingProvider`] that needs no model and no network.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn fnv1a(token: &str) -> u64 {
        token.bytes().fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME))
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let hash = Self::fnv1a(&token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn produces_unit_vectors_of_configured_width() {
        let provider = HashingEmbeddingProvider::new(384);
        let v = provider.embed("Mental health program").await.unwrap();
        assert_eq!(v.len(), 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn is_case_insensitive_and_deterministic() {
        let provider = HashingEmbeddingProvider::new(64);
        let a = provider.embed("Mental Health").await.unwrap();
        let b = provider.embed("mental health").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let provider = HashingEmbeddingProvider::new(384);
        let query = provider.embed("mental health").await.unwrap();
        let related = provider.embed("municipal mental health program").await.unwrap();
        let unrelated = provider.embed("school transport budget").await.unwrap();
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8);
        assert_eq!(provider.embed("  ").await.unwrap(), vec![0.0; 8]);
    }
}
