//! SerpAPI Client
//!
//! Google web search through SerpAPI. The raw response is reshaped into
//! [`SearchHit`]s, with relevance derived from the organic result position
//! (`1 / position`).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::AppError;

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    /// No key was supplied, or it was blank
    #[error("SerpAPI key not configured")]
    NoApiKey,

    /// Transport failure or an `error` field in the SerpAPI response
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::ParseError(msg) => AppError::Parsing(msg),
            other => AppError::Search(other.to_string()),
        }
    }
}

/// One organic web result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result link
    pub url: String,
    /// Page title, empty when SerpAPI omits it
    pub title: String,
    /// Short description shown under the result
    pub snippet: String,
    /// Same as the snippet; SerpAPI does not return page bodies
    pub content: String,
    /// `1 / position`, so the top result scores 1.0
    pub relevance_score: f64,
}

/// Source of raw SerpAPI-shaped JSON
///
/// Implemented by [`SerpApiClient`]; tests substitute canned responses.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run `query` and return the untouched response body, asking for `num` results
    async fn search(&self, query: &str, num: usize) -> Result<Value, SearchError>;
}

/// SerpAPI client for Google web search
pub struct SerpApiClient {
    api_key: String,
}

impl SerpApiClient {
    /// Create a new SerpAPI client
    ///
    /// Fails with [`SearchError::NoApiKey`] for a blank key.
    pub fn new(api_key: String) -> Result<Self, SearchError> {
        if api_key.trim().is_empty() {
            return Err(SearchError::NoApiKey);
        }
        Ok(Self { api_key })
    }

    fn params(query: &str, num: usize) -> HashMap<String, String> {
        let mut params = HashMap::<String, String>::new();
        params.insert("engine".to_string(), "google".to_string());
        params.insert("q".to_string(), query.to_string());
        params.insert("num".to_string(), num.to_string());
        params
    }
}

#[async_trait]
impl SearchBackend for SerpApiClient {
    /// Search Google through SerpAPI
    ///
    /// An `error` field in an otherwise successful response is reported as
    /// [`SearchError::RequestFailed`].
    async fn search(&self, query: &str, num: usize) -> Result<Value, SearchError> {
        info!(query = %query, num, "Searching Google via SerpAPI");

        let search = SerpApiSearch::google(Self::params(query, num), self.api_key.clone());
        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if let Some(error) = results.get("error").and_then(|v| v.as_str()) {
            return Err(SearchError::RequestFailed(error.to_string()));
        }

        debug!("Raw SerpAPI response received");
        Ok(results)
    }
}

/// Reshape `organic_results` into at most `max_results` hits
///
/// A missing or empty list yields no hits. Missing text fields become empty
/// strings and a missing or zero position counts as first place.
pub fn format_results(raw: &Value, max_results: usize) -> Vec<SearchHit> {
    let Some(organic) = raw.get("organic_results").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    organic
        .iter()
        .take(max_results)
        .map(|result| {
            let text = |key: &str| {
                result
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            let position = result
                .get("position")
                .and_then(|v| v.as_u64())
                .filter(|p| *p > 0)
                .unwrap_or(1);
            let snippet = text("snippet");

            SearchHit {
                url: text("link"),
                title: text("title"),
                content: snippet.clone(),
                snippet,
                relevance_score: 1.0 / position as f64,
            }
        })
        .collect()
}
