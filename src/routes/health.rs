use axum::{extract::State, routing::get, Json, Router};

use crate::config::VectorBackend;
use crate::models::{AppState, HealthResponse};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let vector_store = match state.config.pinecone.backend {
        VectorBackend::Pinecone => "pinecone",
        VectorBackend::Memory => "memory",
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vector_store: vector_store.to_string(),
        embedding_model: state.embedder.model_name().to_string(),
    })
}
