//! Feature-hashing embedder.
//!
//! Words and adjacent word pairs are hashed with SHA-256 into signed buckets,
//! then the vector is L2-normalised. Identical text always yields identical
//! vectors, and texts sharing vocabulary land close together, which is enough
//! for ranking in tests and offline runs.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::types::AppResult;

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            self.accumulate(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[tokio::test]
    async fn test_embedding_consistency() {
        let embedder = HashEmbedder::new(384);
        let text = "This is a test sentence for embedding";

        let first = embedder.embed(text).await.unwrap();
        let second = embedder.embed(text).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 384);

        let other = embedder.embed("This is a different sentence.").await.unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_vectors_are_normalised() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed_text("rust async runtimes");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        assert!(embedder.embed_text("  ...  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_ranks_higher() {
        let embedder = HashEmbedder::new(384);
        let query = embedder.embed_text("quantum computing error correction");
        let close = embedder.embed_text("Advances in quantum computing and error correction codes");
        let far = embedder.embed_text("Sourdough baking hydration ratios");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }
}
