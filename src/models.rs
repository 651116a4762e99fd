use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::agents::CrewConfig;
use crate::config::{Config, VectorBackend};
use crate::embeddings::Embedder;
use crate::pinecone_ops::{JobStatus, PineconeOperations};
use crate::types::{AppError, AppResult};
use crate::utils::Pacer;
use crate::vector_store::{InMemoryVectorStore, PineconeClient, VectorStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub embedder: Arc<dyn Embedder>,
    pub pacer: Arc<dyn Pacer>,
    pub crew_config: Arc<CrewConfig>,
    /// Process-wide store for the memory backend; Pinecone clients are built
    /// per request because the key may come from the request.
    pub shared_store: Option<Arc<dyn VectorStore>>,
}

impl AppState {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, pacer: Arc<dyn Pacer>, crew_config: CrewConfig) -> Self {
        let shared_store: Option<Arc<dyn VectorStore>> = match config.pinecone.backend {
            VectorBackend::Memory => Some(Arc::new(InMemoryVectorStore::new())),
            VectorBackend::Pinecone => None,
        };

        Self {
            config,
            embedder,
            pacer,
            crew_config: Arc::new(crew_config),
            shared_store,
        }
    }

    /// A request-supplied key takes precedence over the configured one.
    pub fn vector_store(&self, api_key: Option<&str>) -> AppResult<Arc<dyn VectorStore>> {
        if let Some(store) = &self.shared_store {
            return Ok(store.clone());
        }

        let key = api_key
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.config.pinecone.api_key.clone())
            .ok_or_else(|| AppError::Config("Pinecone API key is required".to_string()))?;
        Ok(Arc::new(PineconeClient::from_config(&key, &self.config.pinecone)))
    }

    pub async fn operations(&self, api_key: Option<&str>) -> AppResult<PineconeOperations> {
        PineconeOperations::connect(self.vector_store(api_key)?, self.embedder.clone(), &self.config.pinecone).await
    }
}

/// Kinds of job tracked in the vector store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Research,
}

/// Per-run state shared with tools
#[derive(Debug)]
pub struct ResearchContext {
    pub job_id: Option<String>,
    pub kind: JobKind,
    pub topic: String,
    pub user_id: String,
    /// Distinct source ids stored under this job; a repeated URL maps to the same id
    sources: Mutex<HashSet<String>>,
}

impl ResearchContext {
    /// Context without a persisted job; tools will not store anything
    pub fn new(topic: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            job_id: None,
            kind: JobKind::Research,
            topic: topic.into(),
            user_id: user_id.into(),
            sources: Mutex::new(HashSet::new()),
        }
    }

    pub fn for_job(job_id: impl Into<String>, topic: impl Into<String>, user_id: impl Into<String>) -> Self {
        let mut ctx = Self::new(topic, user_id);
        ctx.job_id = Some(job_id.into());
        ctx
    }

    /// Returns `false` when the source was already recorded.
    pub fn record_source(&self, source_id: &str) -> bool {
        match self.sources.lock() {
            Ok(mut sources) => sources.insert(source_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(source_id.to_string()),
        }
    }

    pub fn sources_stored(&self) -> usize {
        match self.sources.lock() {
            Ok(sources) => sources.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

// API request and response types

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub serpapi_api_key: Option<String>,
    #[serde(default)]
    pub pinecone_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            user_id: None,
            serpapi_api_key: None,
            pinecone_api_key: None,
            groq_api_key: None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ResearchResponse {
    pub job_id: String,
    pub namespace: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    pub source_count: u64,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct JobSearchQuery {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SourcesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ContentSearchQuery {
    pub q: String,
    pub job_id: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub vector_store: String,
    pub embedding_model: String,
}
