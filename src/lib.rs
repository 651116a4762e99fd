// Cognito Research - single-agent web research with a vector-backed job store

pub mod agents;
pub mod config;
pub mod embeddings;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pinecone_ops;
pub mod routes;
pub mod search; // SerpAPI Google web search
pub mod tools;
pub mod types;
pub mod utils;
pub mod vector_store;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
// Import specific items from types instead of a glob, e.g.
// use cognito_research::types::{AppError, AppResult};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
