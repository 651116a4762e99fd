use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use tracing::debug;

use crate::middleware::header_str;
use crate::models::{AppState, ContentSearchQuery, HistoryQuery, JobSearchQuery, SourcesQuery};
use crate::pinecone_ops::{ContentSource, JobSummary, PineconeOperations, ResearchJob, ScoredSource};
use crate::types::{AppError, AppResult};

/// Lets the UI use its own Pinecone key for read-only calls
pub const PINECONE_KEY_HEADER: &str = "x-pinecone-api-key";

const DEFAULT_HISTORY_LIMIT: usize = 10;
const DEFAULT_SEARCH_LIMIT: usize = 5;
const DEFAULT_SOURCES_LIMIT: usize = 20;
const DEFAULT_TOP_K: usize = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", get(job_history))
        .route("/api/jobs/search", get(search_jobs))
        .route("/api/jobs/{job_id}", get(get_job))
        .route("/api/jobs/{job_id}/sources", get(job_sources))
        .route("/api/content/search", get(search_content))
}

async fn operations(state: &AppState, headers: &HeaderMap) -> AppResult<PineconeOperations> {
    state.operations(header_str(headers, PINECONE_KEY_HEADER)).await
}

async fn job_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<JobSummary>>> {
    let ops = operations(&state, &headers).await?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let user_id = query.user_id.as_deref().filter(|u| !u.is_empty());

    Ok(Json(ops.get_job_history(user_id, limit).await))
}

async fn search_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<JobSearchQuery>,
) -> AppResult<Json<Vec<JobSummary>>> {
    if query.q.trim().is_empty() {
        return Err(AppError::InvalidRequest("Query must not be empty".to_string()));
    }
    let ops = operations(&state, &headers).await?;
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    Ok(Json(ops.search_jobs_by_topic(&query.q, limit).await))
}

async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> AppResult<Json<ResearchJob>> {
    debug!(job_id = %job_id, "Fetching job");
    let ops = operations(&state, &headers).await?;

    ops.get_job(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
}

async fn job_sources(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Query(query): Query<SourcesQuery>,
) -> AppResult<Json<Vec<ContentSource>>> {
    let ops = operations(&state, &headers).await?;
    let limit = query.limit.unwrap_or(DEFAULT_SOURCES_LIMIT);

    Ok(Json(ops.content().get_job_sources(&job_id, limit).await))
}

async fn search_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ContentSearchQuery>,
) -> AppResult<Json<Vec<ScoredSource>>> {
    if query.q.trim().is_empty() {
        return Err(AppError::InvalidRequest("Query must not be empty".to_string()));
    }
    let ops = operations(&state, &headers).await?;
    let job_id = query.job_id.as_deref().filter(|j| !j.is_empty());
    let top_k = query.top_k.unwrap_or(DEFAULT_TOP_K);

    Ok(Json(ops.content().search_content(&query.q, job_id, top_k).await))
}
