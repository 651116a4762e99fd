use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{optional_usize, required_str, Tool};
use crate::models::ResearchContext;
use crate::pinecone_ops::ContentManager;
use crate::search::{format_results, SearchBackend, SearchHit};
use crate::types::AppResult;

/// Google search through SerpAPI. When the run belongs to a job, every hit
/// is also stored as a source of that job.
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    content: Option<ContentManager>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>, max_results: usize) -> Self {
        Self {
            backend,
            content: None,
            max_results: max_results.max(1),
        }
    }

    pub fn with_content(mut self, content: ContentManager) -> Self {
        self.content = Some(content);
        self
    }

    pub async fn search(&self, query: &str, max_results: usize, ctx: &ResearchContext) -> AppResult<Vec<SearchHit>> {
        let raw = self.backend.search(query, max_results).await?;
        let hits = format_results(&raw, max_results);

        if let (Some(job_id), Some(content)) = (ctx.job_id.as_deref(), &self.content) {
            for hit in &hits {
                let source_id = content
                    .store_source(job_id, &hit.url, &hit.title, &hit.snippet, hit.relevance_score)
                    .await?;
                ctx.record_source(&source_id);
            }
            info!(job_id = %job_id, stored = hits.len(), "Stored search results as sources");
        }

        Ok(hits)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn display_name(&self) -> &str {
        "Web Search Tool"
    }

    fn describe(&self) -> &str {
        "Search the web for information on a given topic using SerpAPI"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "max_results": {"type": "integer", "description": "Number of results (default 5)"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, ctx: &ResearchContext) -> AppResult<String> {
        let query = required_str(&args, "query")?;
        let max_results = optional_usize(&args, "max_results").unwrap_or(self.max_results);

        let hits = self.search(query, max_results, ctx).await?;
        if hits.is_empty() {
            return Ok(format!("No search results found for '{}'.", query));
        }
        Ok(serde_json::to_string_pretty(&hits)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::search::SearchError;
    use crate::vector_store::InMemoryVectorStore;
    use std::sync::Mutex;

    struct FakeSearch {
        response: Value,
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl SearchBackend for FakeSearch {
        async fn search(&self, query: &str, num: usize) -> Result<Value, SearchError> {
            self.queries.lock().unwrap().push((query.to_string(), num));
            Ok(self.response.clone())
        }
    }

    fn fake(response: Value) -> Arc<FakeSearch> {
        Arc::new(FakeSearch {
            response,
            queries: Mutex::new(Vec::new()),
        })
    }

    fn two_results() -> Value {
        json!({
            "organic_results": [
                {"position": 1, "title": "Intro to Rust", "link": "https://a.example", "snippet": "Ownership and borrowing"},
                {"position": 2, "title": "Async Rust", "link": "https://b.example", "snippet": "Futures and executors"}
            ]
        })
    }

    #[tokio::test]
    async fn test_results_stored_for_job() {
        let store = Arc::new(InMemoryVectorStore::new());
        let content = ContentManager::new(store.clone(), Arc::new(HashEmbedder::new(64)), "cognito-content");
        let tool = WebSearchTool::new(fake(two_results()), 5).with_content(content.clone());
        let ctx = ResearchContext::for_job("abc123", "rust", "u");

        let hits = tool.search("rust", 5, &ctx).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].relevance_score, 0.5);
        assert_eq!(ctx.sources_stored(), 2);
        assert_eq!(store.count("cognito-content", "job_abc123").await, 2);

        let sources = content.get_job_sources("abc123", 10).await;
        let best = sources.iter().find(|s| s.url == "https://a.example").unwrap();
        assert_eq!(best.credibility_score, 1.0);
        assert_eq!(best.content_preview, "Ownership and borrowing");
    }

    #[tokio::test]
    async fn test_repeated_urls_counted_once() {
        let store = Arc::new(InMemoryVectorStore::new());
        let content = ContentManager::new(store.clone(), Arc::new(HashEmbedder::new(64)), "cognito-content");
        let tool = WebSearchTool::new(fake(two_results()), 5).with_content(content.clone());
        let ctx = ResearchContext::for_job("j1", "rust", "u");

        tool.search("rust", 5, &ctx).await.unwrap();
        tool.search("rust ownership", 5, &ctx).await.unwrap();

        let stored = content.get_job_sources("j1", 10).await.len();
        assert_eq!(stored, 2);
        assert_eq!(ctx.sources_stored(), stored);
    }

    #[tokio::test]
    async fn test_no_job_means_no_storage() {
        let store = Arc::new(InMemoryVectorStore::new());
        let content = ContentManager::new(store.clone(), Arc::new(HashEmbedder::new(64)), "cognito-content");
        let tool = WebSearchTool::new(fake(two_results()), 5).with_content(content);
        let ctx = ResearchContext::new("rust", "u");

        let out = tool.invoke(json!({"query": "rust"}), &ctx).await.unwrap();
        assert!(out.contains("https://a.example"));
        assert_eq!(ctx.sources_stored(), 0);
        assert_eq!(store.count("cognito-content", "").await, 0);
    }

    #[tokio::test]
    async fn test_invoke_passes_result_count() {
        let backend = fake(json!({"organic_results": []}));
        let tool = WebSearchTool::new(backend.clone(), 5);
        let ctx = ResearchContext::new("rust", "u");

        let out = tool.invoke(json!({"query": "rust", "max_results": 3}), &ctx).await.unwrap();
        assert_eq!(out, "No search results found for 'rust'.");
        assert_eq!(backend.queries.lock().unwrap()[0], ("rust".to_string(), 3));
    }
}
