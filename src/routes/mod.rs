//! API Routes
//!
//! - `/` - Single-page UI
//! - `/api/health` - Health check (never password protected)
//! - `/api/research` - Run a research job
//! - `/api/jobs` - Job history, search, records and sources
//! - `/api/content/search` - Similarity search over stored sources
//!
//! Everything under `/api` except health requires `x-access-password` when
//! `UI_PASSWORD` is set.

pub mod health;
pub mod jobs;
pub mod research;
pub mod ui;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::{cors_layer, require_password};
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let protected = Router::new()
        .merge(research::router())
        .merge(jobs::router())
        .route_layer(from_fn_with_state(state.clone(), require_password));

    Router::new()
        .merge(ui::router())
        .merge(health::router())
        .merge(protected)
        .layer(cors_layer(&state.config.server.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CrewConfig;
    use crate::config::{Config, VectorBackend};
    use crate::embeddings::HashEmbedder;
    use crate::models::HealthResponse;
    use crate::utils::throttle::testing::fake_throttle;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(password: Option<&str>) -> AppState {
        let mut config = Config::default();
        config.pinecone.backend = VectorBackend::Memory;
        config.auth.ui_password = password.map(str::to_string);
        let (throttle, _) = fake_throttle(6000);

        AppState::new(
            config,
            Arc::new(HashEmbedder::new(384)),
            Arc::new(throttle),
            CrewConfig::embedded().unwrap(),
        )
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let app = create_router(state(Some("secret")));
        let response = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.vector_store, "memory");
    }

    #[tokio::test]
    async fn test_ui_served() {
        let app = create_router(state(Some("secret")));
        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8_lossy(&bytes);
        assert!(page.contains("Cognito Research Agent"));
        assert!(page.contains("function renderMarkdown"));
        assert!(page.contains("showReport(job.report)"));
        assert!(!page.contains("<pre id=\"report\">"));
    }

    #[tokio::test]
    async fn test_password_gates_api() {
        let app = create_router(state(Some("secret")));

        let denied = app.clone().oneshot(get("/api/jobs")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let wrong = Request::builder()
            .uri("/api/jobs")
            .header("x-access-password", "guess")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(wrong).await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let allowed = Request::builder()
            .uri("/api/jobs")
            .header("x-access-password", "secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(allowed).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, Value::Array(vec![]));
    }

    #[tokio::test]
    async fn test_job_lookup() {
        let state = state(None);
        let ops = state.operations(None).await.unwrap();
        let handle = ops.create_research_job("vector databases", "bob").await.unwrap();
        let app = create_router(state);

        let response = app.clone().oneshot(get(&format!("/api/jobs/{}", handle.job_id))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = json_body(response).await;
        assert_eq!(job["topic"], "vector databases");
        assert_eq!(job["status"], "pending");

        let history = json_body(app.clone().oneshot(get("/api/jobs?user_id=bob")).await.unwrap()).await;
        assert_eq!(history[0]["job_id"], handle.job_id.as_str());

        let missing = app.oneshot(get("/api/jobs/ffffffffffff")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["kind"], "unknown_error");
    }

    #[tokio::test]
    async fn test_sources_and_content_search() {
        let state = state(None);
        let ops = state.operations(None).await.unwrap();
        ops.content()
            .store_source("job1", "https://tokio.rs", "Tokio", "An asynchronous runtime for Rust", 0.9)
            .await
            .unwrap();
        let app = create_router(state);

        let sources = json_body(app.clone().oneshot(get("/api/jobs/job1/sources")).await.unwrap()).await;
        assert_eq!(sources.as_array().unwrap().len(), 1);
        assert_eq!(sources[0]["url"], "https://tokio.rs");

        let hits = json_body(
            app.clone()
                .oneshot(get("/api/content/search?q=async%20runtime&job_id=job1"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(hits[0]["title"], "Tokio");
        assert!(hits[0]["relevance_score"].is_number());

        let empty = app.oneshot(get("/api/content/search?q=%20")).await.unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_research_rejects_blank_topic() {
        let app = create_router(state(None));
        let request = Request::builder()
            .method("POST")
            .uri("/api/research")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"topic": "  "}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
