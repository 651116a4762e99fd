//! Embeddings
//!
//! Turns free text into fixed-length vectors for the vector store. Two
//! providers are available:
//!
//! - **local**: `all-MiniLM-L6-v2` through fastembed (384 dims), loaded once at
//!   startup. Requires the `local-embeddings` feature.
//! - **hash**: a deterministic feature-hashing embedder with no model download,
//!   used by tests and offline demos.
//!
//! Vectors are only ever used for ranking; the records' metadata is the
//! source of truth.

pub mod hashing;
#[cfg(feature = "local-embeddings")]
pub mod local;

pub use hashing::HashEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(feature = "local-embeddings")]
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::types::{AppError, AppResult};

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dims(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Empty embedding response".to_string()))
    }
}

/// Build the configured embedder. Model load failures are returned to the
/// caller, which treats them as fatal.
pub fn create_embedder(config: &EmbeddingConfig) -> AppResult<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims))),
        #[cfg(feature = "local-embeddings")]
        "local" => {
            info!(model = %config.model, "Loading local embedding model");
            let embedder = LocalEmbedder::load(&config.model)?;
            info!(model = %config.model, dims = embedder.dims(), "Embedding model loaded");
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(AppError::Config(
            "Local embeddings require the `local-embeddings` feature".to_string(),
        )),
        other => Err(AppError::Config(format!("Unknown embedding provider: {}", other))),
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
