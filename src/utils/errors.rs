// Job failure bookkeeping

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::models::JobKind;
use crate::types::{AppError, AppResult, ErrorKind};

/// Structured description of a failed job, returned to callers and logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub details: Map<String, Value>,
}

impl ResearchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn user_message(&self) -> &'static str {
        user_friendly_message(self.kind)
    }
}

impl From<&AppError> for ResearchError {
    fn from(err: &AppError) -> Self {
        let info = ResearchError::new(err.kind(), err.to_string());
        if info.kind == ErrorKind::Unknown {
            info.with_detail("exception_type", err.variant_name())
        } else {
            info
        }
    }
}

/// Marks a job of one kind as failed.
#[async_trait]
pub trait JobStatusUpdater: Send + Sync {
    /// Returns `false` when the job could not be found or written.
    async fn mark_error(&self, job_id: &str, message: &str) -> AppResult<bool>;
}

/// Routes job failures to the updater registered for the job's kind.
#[derive(Clone, Default)]
pub struct ErrorHandler {
    updaters: HashMap<JobKind, Arc<dyn JobStatusUpdater>>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: JobKind, updater: Arc<dyn JobStatusUpdater>) -> Self {
        self.updaters.insert(kind, updater);
        self
    }

    /// Log the failure and mark the job as errored. Failures while updating
    /// the job are logged and never replace the original error.
    pub async fn handle_error(&self, job_id: &str, kind: JobKind, err: &AppError) -> ResearchError {
        let info = ResearchError::from(err);
        error!(job_id = %job_id, job_kind = ?kind, error_type = %info.kind, message = %info.message, "Job failed");

        match self.updaters.get(&kind) {
            Some(updater) => match updater.mark_error(job_id, &info.message).await {
                Ok(true) => {}
                Ok(false) => warn!(job_id = %job_id, "Failed job could not be marked as error"),
                Err(update_error) => error!(job_id = %job_id, error = %update_error, "Failed to update job status"),
            },
            None => warn!(job_id = %job_id, job_kind = ?kind, "No status updater registered for job kind"),
        }

        info
    }
}

/// Message shown to end users; deliberately less detailed than the log.
pub fn user_friendly_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => "Unable to connect to external services. Please try again later.",
        ErrorKind::Api => "External API is currently unavailable. Please try again later.",
        ErrorKind::Parsing => "Unable to process the retrieved content. Please try a different topic.",
        ErrorKind::VectorStore => "Vector database error. Please contact support.",
        ErrorKind::Agent => "AI agent encountered an error. Please try again with a more specific topic.",
        ErrorKind::Timeout => "Request timed out. Please try again or contact support.",
        ErrorKind::Embedding => "Text embedding generation failed. Please try again.",
        ErrorKind::Unknown => "An unexpected error occurred. Please try again.",
    }
}
