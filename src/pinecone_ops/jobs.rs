//! Research job records.
//!
//! Jobs are stored as vectors in the `jobs` namespace of the jobs index. The
//! metadata map is the record; the vector is an embedding of a short status
//! line, so "history" and "search" are similarity queries rather than scans.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{generate_job_id, job_namespace, lenient, now_rfc3339};
use crate::embeddings::Embedder;
use crate::types::{AppError, AppResult};
use crate::vector_store::{Metadata, MetadataFilter, QueryMatch, QueryRequest, VectorRecord, VectorStore};

pub const JOBS_NAMESPACE: &str = "jobs";
pub const RESEARCH_JOB_TYPE: &str = "research";
pub const DEFAULT_USER: &str = "anonymous";

/// Characters of the report folded into the job embedding
const REPORT_EMBED_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchJob {
    pub job_id: String,
    pub topic: String,
    pub user_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
    pub namespace: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub source_count: u64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub processing_time_seconds: f64,
    #[serde(default)]
    pub report: String,
    #[serde(default)]
    pub error_message: String,
}

impl ResearchJob {
    fn from_metadata(metadata: Metadata) -> AppResult<Self> {
        Ok(serde_json::from_value(Value::Object(metadata))?)
    }

    fn to_metadata(&self) -> AppResult<Metadata> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(AppError::Internal(format!("Job serialized to non-object: {}", other))),
        }
    }

    /// Text embedded alongside the record
    fn embedding_text(&self, report: Option<&str>) -> String {
        let mut text = format!(
            "Research job: {} Status: {} Type: {}",
            self.topic, self.status, self.job_type
        );
        if let Some(report) = report {
            let head: String = report.chars().take(REPORT_EMBED_CHARS).collect();
            text.push_str(" Report: ");
            text.push_str(&head);
        }
        text
    }
}

/// Identifiers returned when a job is created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHandle {
    pub job_id: String,
    pub namespace: String,
}

/// A job surfaced by a similarity query
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    #[serde(flatten)]
    pub job: ResearchJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
}

/// Fields to change on a job. `None` and empty strings leave the stored
/// value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub report: Option<String>,
    pub error_message: Option<String>,
    pub source_count: Option<u64>,
    pub processing_time_seconds: Option<f64>,
}

impl JobUpdate {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            report: None,
            error_message: None,
            source_count: None,
            processing_time_seconds: None,
        }
    }

    pub fn complete(report: impl Into<String>) -> Self {
        Self::new(JobStatus::Complete).with_report(report)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let mut update = Self::new(JobStatus::Error);
        update.error_message = Some(message.into());
        update
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }

    pub fn with_source_count(mut self, count: u64) -> Self {
        self.source_count = Some(count);
        self
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time_seconds = Some(seconds);
        self
    }

    /// The report, when it carries any text
    fn report_text(&self) -> Option<&str> {
        self.report.as_deref().filter(|r| !r.is_empty())
    }

    fn apply(&self, job: &mut ResearchJob) {
        job.status = self.status;
        job.updated_at = now_rfc3339();
        if let Some(report) = self.report_text() {
            job.report = report.to_string();
        }
        if let Some(message) = self.error_message.as_deref().filter(|m| !m.is_empty()) {
            job.error_message = message.to_string();
        }
        if let Some(count) = self.source_count {
            job.source_count = count;
        }
        if let Some(seconds) = self.processing_time_seconds {
            job.processing_time_seconds = seconds;
        }
    }
}

#[derive(Clone)]
pub struct ResearchJobManager {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    index: String,
}

impl ResearchJobManager {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, index: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            index: index.into(),
        }
    }

    pub async fn create_job(&self, topic: &str, user_id: &str) -> AppResult<JobHandle> {
        let created_at = now_rfc3339();
        let job_id = generate_job_id(topic, RESEARCH_JOB_TYPE, &created_at);
        let namespace = job_namespace(&job_id);
        let user_id = if user_id.trim().is_empty() { DEFAULT_USER } else { user_id };

        let job = ResearchJob {
            job_id: job_id.clone(),
            topic: topic.to_string(),
            user_id: user_id.to_string(),
            job_type: RESEARCH_JOB_TYPE.to_string(),
            status: JobStatus::Pending,
            created_at: created_at.clone(),
            updated_at: created_at,
            namespace: namespace.clone(),
            source_count: 0,
            processing_time_seconds: 0.0,
            report: String::new(),
            error_message: String::new(),
        };

        self.put_job(&job, None).await?;
        info!(job_id = %job_id, topic = %topic, user_id = %user_id, "Created research job");
        Ok(JobHandle { job_id, namespace })
    }

    /// Merge `update` into the stored job. Returns `false` when the job does
    /// not exist or the store rejects the write.
    pub async fn update_job_status(&self, job_id: &str, update: JobUpdate) -> bool {
        match self.try_update(job_id, &update).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Error updating job");
                false
            }
        }
    }

    async fn try_update(&self, job_id: &str, update: &JobUpdate) -> AppResult<bool> {
        let Some(mut job) = self.get_job(job_id).await? else {
            warn!(job_id = %job_id, "Update requested for unknown job");
            return Ok(false);
        };

        update.apply(&mut job);
        self.put_job(&job, update.report_text()).await?;
        debug!(job_id = %job_id, status = %job.status, "Job updated");
        Ok(true)
    }

    /// Embed and upsert the full record
    pub(crate) async fn put_job(&self, job: &ResearchJob, report: Option<&str>) -> AppResult<()> {
        let values = self.embedder.embed(&job.embedding_text(report)).await?;
        let record = VectorRecord {
            id: job.job_id.clone(),
            values,
            metadata: job.to_metadata()?,
        };
        self.store.upsert(&self.index, JOBS_NAMESPACE, vec![record]).await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> AppResult<Option<ResearchJob>> {
        let mut found = self
            .store
            .fetch(&self.index, JOBS_NAMESPACE, &[job_id.to_string()])
            .await?;

        match found.remove(job_id) {
            Some(record) => Ok(Some(ResearchJob::from_metadata(record.metadata)?)),
            None => Ok(None),
        }
    }

    /// Recent jobs, newest first. Only the `limit` nearest records to a
    /// generic history query are considered, so older jobs can be missing.
    pub async fn get_job_history(&self, user_id: Option<&str>, limit: usize) -> Vec<JobSummary> {
        match self.try_history(user_id, limit).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Error fetching job history");
                Vec::new()
            }
        }
    }

    async fn try_history(&self, user_id: Option<&str>, limit: usize) -> AppResult<Vec<JobSummary>> {
        let user_id = user_id.filter(|u| !u.is_empty());
        let query_text = match user_id {
            Some(user) => format!("Research jobs for user {} job history", user),
            None => "Research job history all jobs".to_string(),
        };

        let mut filter = MetadataFilter::field_eq("job_type", RESEARCH_JOB_TYPE);
        if let Some(user) = user_id {
            filter = filter.and_eq("user_id", user);
        }

        let vector = self.embedder.embed(&query_text).await?;
        let request = QueryRequest::new(JOBS_NAMESPACE, vector, limit).with_filter(filter);
        let matches = self.store.query(&self.index, request).await?;

        let mut jobs: Vec<JobSummary> = summaries(matches)
            .map(|(job, score)| JobSummary {
                job,
                score: Some(score),
                similarity_score: None,
            })
            .collect();
        sort_newest_first(&mut jobs);
        Ok(jobs)
    }

    /// Jobs whose topic is closest to `text`, best match first.
    pub async fn search_jobs_by_topic(&self, text: &str, limit: usize) -> Vec<JobSummary> {
        let result: AppResult<Vec<JobSummary>> = async {
            let vector = self.embedder.embed(&format!("Research topic: {}", text)).await?;
            let matches = self
                .store
                .query(&self.index, QueryRequest::new(JOBS_NAMESPACE, vector, limit))
                .await?;
            Ok(summaries(matches)
                .map(|(job, score)| JobSummary {
                    job,
                    score: None,
                    similarity_score: Some(score),
                })
                .collect())
        }
        .await;

        result.unwrap_or_else(|e| {
            error!(error = %e, "Error searching jobs");
            Vec::new()
        })
    }
}

/// Matches that parse as jobs, paired with their score
fn summaries(matches: Vec<QueryMatch>) -> impl Iterator<Item = (ResearchJob, f32)> {
    matches.into_iter().filter_map(|m| {
        let id = m.id;
        match ResearchJob::from_metadata(m.metadata) {
            Ok(job) => Some((job, m.score)),
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping malformed job record");
                None
            }
        }
    })
}

pub(crate) fn sort_newest_first(jobs: &mut [JobSummary]) {
    jobs.sort_by(|a, b| b.job.created_at.cmp(&a.job.created_at));
}
