//! Local sentence embeddings through fastembed.
//!
//! The ONNX model is downloaded from Hugging Face on first use and cached;
//! afterwards embedding runs fully offline.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::Embedder;
use crate::types::{AppError, AppResult};

pub struct LocalEmbedder {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
}

impl LocalEmbedder {
    pub fn load(model_name: &str) -> AppResult<Self> {
        let (model, dims) = resolve_model(model_name)?;
        let embedding = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model).with_show_download_progress(true),
        )
        .map_err(|e| AppError::Embedding(format!("Failed to initialize local embedding model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_name: model_name.to_string(),
            dims,
        })
    }
}

fn resolve_model(name: &str) -> AppResult<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        other => Err(AppError::Config(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
            other
        ))),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| AppError::Embedding("Embedding model lock poisoned".to_string()))?;
            guard
                .embed(texts, None)
                .map_err(|e| AppError::Embedding(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| AppError::Embedding(format!("Embedding task failed: {}", e)))?
    }
}
