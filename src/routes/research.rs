use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use crate::agents::execute_research_pipeline;
use crate::models::{AppState, ResearchRequest, ResearchResponse};
use crate::types::AppResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/research", post(start_research))
}

/// Runs the whole crew before answering; failures of the run itself come
/// back as a job with status `error`.
async fn start_research(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> AppResult<Json<ResearchResponse>> {
    info!(topic = %request.topic, user_id = ?request.user_id, "Received research request");

    let response = execute_research_pipeline(&state, request).await?;
    info!(job_id = %response.job_id, status = %response.status, "Research request finished");

    Ok(Json(response))
}
