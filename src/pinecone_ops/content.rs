//! Research sources, stored per job in the content index.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{generate_source_id, job_namespace, lenient, now_rfc3339};
use crate::embeddings::Embedder;
use crate::types::{AppError, AppResult};
use crate::vector_store::{QueryMatch, QueryRequest, VectorRecord, VectorStore};

pub const DEFAULT_CREDIBILITY: f64 = 0.5;
pub const WEB_ARTICLE: &str = "web_article";

const PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    pub source_id: String,
    pub job_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content_preview: String,
    #[serde(default, deserialize_with = "lenient::float")]
    pub credibility_score: f64,
    #[serde(default)]
    pub scraped_at: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub content_length: u64,
    #[serde(default)]
    pub source_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredSource {
    #[serde(flatten)]
    pub source: ContentSource,
    pub relevance_score: f32,
}

#[derive(Clone)]
pub struct ContentManager {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    index: String,
}

impl ContentManager {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, index: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            index: index.into(),
        }
    }

    /// Store one source under the job's namespace and return its id.
    /// Storing the same URL twice for a job overwrites the first record.
    pub async fn store_source(
        &self,
        job_id: &str,
        url: &str,
        title: &str,
        content: &str,
        credibility_score: f64,
    ) -> AppResult<String> {
        let source_id = generate_source_id(job_id, url);
        let source = ContentSource {
            source_id: source_id.clone(),
            job_id: job_id.to_string(),
            url: url.to_string(),
            title: title.to_string(),
            content_preview: content.chars().take(PREVIEW_CHARS).collect(),
            credibility_score,
            scraped_at: now_rfc3339(),
            content_length: content.chars().count() as u64,
            source_type: WEB_ARTICLE.to_string(),
        };

        let metadata = match serde_json::to_value(&source)? {
            Value::Object(map) => map,
            other => return Err(AppError::Internal(format!("Source serialized to non-object: {}", other))),
        };
        let values = self
            .embedder
            .embed(&format!("Title: {} Content: {}", title, content))
            .await?;

        self.store
            .upsert(
                &self.index,
                &job_namespace(job_id),
                vec![VectorRecord {
                    id: source_id.clone(),
                    values,
                    metadata,
                }],
            )
            .await?;

        debug!(job_id = %job_id, source_id = %source_id, url = %url, "Stored source");
        Ok(source_id)
    }

    /// Up to `limit` sources of a job, ranked against a generic query.
    pub async fn get_job_sources(&self, job_id: &str, limit: usize) -> Vec<ContentSource> {
        match self.query(job_namespace(job_id), "research sources content", limit).await {
            Ok(matches) => sources(matches).map(|(source, _)| source).collect(),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Error fetching sources for job");
                Vec::new()
            }
        }
    }

    /// Semantic search over stored sources. Scoped to one job when `job_id`
    /// is given, otherwise the default namespace.
    pub async fn search_content(&self, query: &str, job_id: Option<&str>, top_k: usize) -> Vec<ScoredSource> {
        let namespace = job_id
            .filter(|id| !id.is_empty())
            .map(job_namespace)
            .unwrap_or_default();

        match self.query(namespace, query, top_k).await {
            Ok(matches) => sources(matches)
                .map(|(source, score)| ScoredSource {
                    source,
                    relevance_score: score,
                })
                .collect(),
            Err(e) => {
                error!(error = %e, "Error searching content");
                Vec::new()
            }
        }
    }

    async fn query(&self, namespace: String, text: &str, top_k: usize) -> AppResult<Vec<QueryMatch>> {
        let vector = self.embedder.embed(text).await?;
        self.store
            .query(&self.index, QueryRequest::new(namespace, vector, top_k))
            .await
    }
}

fn sources(matches: Vec<QueryMatch>) -> impl Iterator<Item = (ContentSource, f32)> {
    matches.into_iter().filter_map(|m| {
        let id = m.id;
        match serde_json::from_value::<ContentSource>(Value::Object(m.metadata)) {
            Ok(source) => Some((source, m.score)),
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping malformed source record");
                None
            }
        }
    })
}
