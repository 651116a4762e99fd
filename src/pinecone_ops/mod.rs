//! Vector-backed data access
//!
//! Jobs and their sources are persisted as (vector, metadata) pairs. Lookups
//! by id are exact fetches; listings and searches are top-k similarity
//! queries, so they return the nearest records rather than every match.
//!
//! - [`ResearchJobManager`]: job lifecycle records in `cognito-jobs`
//! - [`ContentManager`]: per-job sources in `cognito-content`
//! - [`PineconeOperations`]: facade over both, used by routes and the crew

pub mod content;
pub mod jobs;

pub use content::{ContentManager, ContentSource, ScoredSource, DEFAULT_CREDIBILITY};
pub use jobs::{JobHandle, JobStatus, JobSummary, JobUpdate, ResearchJob, ResearchJobManager};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::PineconeConfig;
use crate::embeddings::Embedder;
use crate::types::AppResult;
use crate::utils::errors::JobStatusUpdater;
use crate::vector_store::{IndexSpec, VectorStore};

/// Job ids are the first 12 hex chars of SHA-256("{job_type}_{topic}_{timestamp}")
pub fn generate_job_id(topic: &str, job_type: &str, timestamp: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}_{}", job_type, topic, timestamp).as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Source ids are "{job_id}_" followed by 8 hex chars of SHA-256(url)
pub fn generate_source_id(job_id: &str, url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{}_{}", job_id, &hex::encode(digest)[..8])
}

pub fn job_namespace(job_id: &str) -> String {
    format!("job_{}", job_id)
}

/// Fixed-width UTC timestamp; lexical order matches chronological order.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Pinecone returns every number as a float; accept either shape.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_u64()
            .or_else(|| value.as_f64().map(|f| f.max(0.0).round() as u64))
            .unwrap_or(0))
    }

    pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_f64().unwrap_or(0.0))
    }
}

#[derive(Clone)]
pub struct PineconeOperations {
    jobs: ResearchJobManager,
    content: ContentManager,
}

impl PineconeOperations {
    /// Create both indexes when missing and wire the managers to them.
    pub async fn connect(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &PineconeConfig,
    ) -> AppResult<Self> {
        for name in [&config.jobs_index, &config.content_index] {
            store
                .ensure_index(&IndexSpec {
                    name: name.clone(),
                    dimension: embedder.dims(),
                    metric: config.metric.clone(),
                    cloud: config.cloud.clone(),
                    region: config.region.clone(),
                })
                .await?;
        }

        Ok(Self {
            jobs: ResearchJobManager::new(store.clone(), embedder.clone(), config.jobs_index.clone()),
            content: ContentManager::new(store, embedder, config.content_index.clone()),
        })
    }

    pub fn jobs(&self) -> &ResearchJobManager {
        &self.jobs
    }

    pub fn content(&self) -> &ContentManager {
        &self.content
    }

    pub async fn create_research_job(&self, topic: &str, user_id: &str) -> AppResult<JobHandle> {
        self.jobs.create_job(topic, user_id).await
    }

    pub async fn update_research_job(&self, job_id: &str, update: JobUpdate) -> bool {
        self.jobs.update_job_status(job_id, update).await
    }

    pub async fn get_job(&self, job_id: &str) -> AppResult<Option<ResearchJob>> {
        self.jobs.get_job(job_id).await
    }

    pub async fn get_job_history(&self, user_id: Option<&str>, limit: usize) -> Vec<JobSummary> {
        let mut jobs = self.jobs.get_job_history(user_id, limit).await;
        jobs::sort_newest_first(&mut jobs);
        jobs.truncate(limit);
        jobs
    }

    pub async fn search_jobs_by_topic(&self, text: &str, limit: usize) -> Vec<JobSummary> {
        self.jobs.search_jobs_by_topic(text, limit).await
    }

    /// Pinecone has no TTL and this layer keeps no record of ids by age, so
    /// nothing is deleted. Returns the number of records removed.
    pub async fn cleanup_old_data(&self, days_old: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(days_old);
        info!(days_old, cutoff = %cutoff.to_rfc3339_opts(SecondsFormat::Secs, true), "Cleanup requested; no records removed");
        0
    }
}

#[async_trait]
impl JobStatusUpdater for ResearchJobManager {
    async fn mark_error(&self, job_id: &str, message: &str) -> AppResult<bool> {
        Ok(self.update_job_status(job_id, JobUpdate::failed(message)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embeddings::HashEmbedder;
    use crate::vector_store::InMemoryVectorStore;

    async fn operations() -> PineconeOperations {
        let config = Config::default().pinecone;
        PineconeOperations::connect(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(384)),
            &config,
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_id_formats() {
        let job_id = generate_job_id("test topic", "research", "2024-01-01T00:00:00Z");
        assert_eq!(job_id.len(), 12);
        assert!(job_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(job_id, generate_job_id("test topic", "research", "2024-01-01T00:00:00Z"));
        assert_ne!(job_id, generate_job_id("test topic", "research", "2024-01-01T00:00:01Z"));

        let source_id = generate_source_id(&job_id, "https://example.com");
        let (prefix, suffix) = source_id.rsplit_once('_').unwrap();
        assert_eq!(prefix, job_id);
        assert_eq!(suffix.len(), 8);
        assert_eq!(job_namespace("abc"), "job_abc");
    }

    #[tokio::test]
    async fn test_create_research_job() {
        let ops = operations().await;
        let handle = ops.create_research_job("test topic", "anonymous").await.unwrap();
        assert!(!handle.job_id.is_empty());
        assert!(handle.namespace.starts_with("job_"));
    }

    #[tokio::test]
    async fn test_update_nonexistent_job() {
        let ops = operations().await;
        assert!(!ops.update_research_job("nonexistent", JobUpdate::new(JobStatus::Complete)).await);
    }

    #[tokio::test]
    async fn test_mark_error_through_updater() {
        let ops = operations().await;
        let handle = ops.create_research_job("flaky topic", "u").await.unwrap();

        let updater: &dyn JobStatusUpdater = ops.jobs();
        assert!(updater.mark_error(&handle.job_id, "boom").await.unwrap());

        let job = ops.get_job(&handle.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_message, "boom");
    }

    #[tokio::test]
    async fn test_cleanup_is_noop() {
        let ops = operations().await;
        ops.create_research_job("keep me", "u").await.unwrap();
        assert_eq!(ops.cleanup_old_data(7).await, 0);
        assert_eq!(ops.get_job_history(None, 10).await.len(), 1);
    }
}
