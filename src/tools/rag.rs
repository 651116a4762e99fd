use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{optional_usize, required_str, Tool};
use crate::models::ResearchContext;
use crate::pinecone_ops::{JobSummary, PineconeOperations, ScoredSource};
use crate::types::AppResult;

const DEFAULT_TOP_K: usize = 5;
const SIMILAR_RESEARCH_LIMIT: usize = 3;

/// Retrieval over previously stored sources.
pub struct RagTool {
    ops: PineconeOperations,
}

impl RagTool {
    pub fn new(ops: PineconeOperations) -> Self {
        Self { ops }
    }

    pub async fn retrieve(&self, query: &str, job_id: Option<&str>, top_k: usize) -> Vec<ScoredSource> {
        self.ops.content().search_content(query, job_id, top_k).await
    }

    pub async fn context_string(&self, query: &str, job_id: Option<&str>, top_k: usize) -> String {
        format_context(&self.retrieve(query, job_id, top_k).await)
    }

    /// Earlier jobs on nearby topics
    pub async fn similar_research(&self, topic: &str, limit: Option<usize>) -> Vec<JobSummary> {
        self.ops
            .search_jobs_by_topic(topic, limit.unwrap_or(SIMILAR_RESEARCH_LIMIT))
            .await
    }
}

/// Earlier jobs as a short list the model can cite or build on
pub fn format_similar(jobs: &[JobSummary]) -> String {
    if jobs.is_empty() {
        return "No similar past research found.".to_string();
    }

    let mut out = String::from("Similar past research:\n\n");
    for summary in jobs {
        let job = &summary.job;
        let _ = write!(out, "- {} (job {}, {}", job.topic, job.job_id, job.status);
        if let Some(score) = summary.similarity_score.or(summary.score) {
            let _ = write!(out, ", similarity {:.3}", score);
        }
        out.push_str(")\n");
    }
    out
}

pub fn format_context(sources: &[ScoredSource]) -> String {
    if sources.is_empty() {
        return "No relevant context found.".to_string();
    }

    let mut out = String::from("Relevant context:\n\n");
    for (i, scored) in sources.iter().enumerate() {
        let source = &scored.source;
        let _ = write!(
            out,
            "Source {}: {}\nURL: {}\nContent: {}\nRelevance: {:.3}\n\n",
            i + 1,
            source.title,
            source.url,
            source.content_preview,
            scored.relevance_score
        );
    }
    out
}

#[async_trait]
impl Tool for RagTool {
    fn name(&self) -> &str {
        "pinecone_rag"
    }

    fn display_name(&self) -> &str {
        "Pinecone RAG Tool"
    }

    fn describe(&self) -> &str {
        "Retrieve relevant context from Pinecone vector database"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to look up"},
                "job_id": {"type": "string", "description": "Restrict to one research job"},
                "top_k": {"type": "integer", "description": "Number of passages (default 5)"},
                "include_similar": {"type": "boolean", "description": "Also list earlier research on similar topics"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, ctx: &ResearchContext) -> AppResult<String> {
        let query = required_str(&args, "query")?;
        let job_id = args
            .get("job_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .or(ctx.job_id.as_deref());
        let top_k = optional_usize(&args, "top_k").unwrap_or(DEFAULT_TOP_K);

        let mut out = self.context_string(query, job_id, top_k).await;
        if args.get("include_similar").and_then(Value::as_bool).unwrap_or(false) {
            let similar = self.similar_research(&ctx.topic, None).await;
            // the running job is always its own nearest neighbour
            let earlier: Vec<JobSummary> = similar
                .into_iter()
                .filter(|s| Some(s.job.job_id.as_str()) != ctx.job_id.as_deref())
                .collect();
            out.push('\n');
            out.push_str(&format_similar(&earlier));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embeddings::HashEmbedder;
    use crate::vector_store::InMemoryVectorStore;
    use std::sync::Arc;

    async fn ops() -> PineconeOperations {
        PineconeOperations::connect(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(384)),
            &Config::default().pinecone,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_context() {
        let tool = RagTool::new(ops().await);
        let ctx = ResearchContext::for_job("nothing", "t", "u");
        let out = tool.invoke(json!({"query": "anything"}), &ctx).await.unwrap();
        assert_eq!(out, "No relevant context found.");
    }

    #[tokio::test]
    async fn test_context_block_uses_job_scope() {
        let ops = ops().await;
        ops.content()
            .store_source("job1", "https://a.io", "Borrowing", "The borrow checker enforces aliasing rules", 0.9)
            .await
            .unwrap();
        let tool = RagTool::new(ops);

        let ctx = ResearchContext::for_job("job1", "rust", "u");
        let out = tool.invoke(json!({"query": "borrow checker"}), &ctx).await.unwrap();
        assert!(out.starts_with("Relevant context:\n\nSource 1: Borrowing\nURL: https://a.io\n"));
        assert!(out.contains("Content: The borrow checker enforces aliasing rules\nRelevance: 0."));

        // explicit job id wins over the context
        let other = tool
            .invoke(json!({"query": "borrow checker", "job_id": "job2"}), &ctx)
            .await
            .unwrap();
        assert_eq!(other, "No relevant context found.");
    }

    #[tokio::test]
    async fn test_similar_research_defaults_to_three() {
        let ops = ops().await;
        for topic in ["rust async", "rust traits", "rust macros", "rust ownership"] {
            ops.create_research_job(topic, "u").await.unwrap();
        }
        let tool = RagTool::new(ops);
        assert_eq!(tool.similar_research("rust", None).await.len(), 3);
    }

    #[tokio::test]
    async fn test_invoke_lists_similar_research() {
        let ops = ops().await;
        let earlier = ops.create_research_job("rust async runtimes", "u").await.unwrap();
        let current = ops.create_research_job("rust async", "u").await.unwrap();
        let tool = RagTool::new(ops);
        let ctx = ResearchContext::for_job(&current.job_id, "rust async", "u");

        let out = tool
            .invoke(json!({"query": "executors", "include_similar": true}), &ctx)
            .await
            .unwrap();
        assert!(out.starts_with("No relevant context found.\nSimilar past research:\n\n"));
        assert!(out.contains(&format!("- rust async runtimes (job {}, pending", earlier.job_id)));
        assert!(!out.contains(&current.job_id));

        let plain = tool.invoke(json!({"query": "executors"}), &ctx).await.unwrap();
        assert_eq!(plain, "No relevant context found.");
    }

    #[test]
    fn test_relevance_has_three_decimals() {
        let scored = ScoredSource {
            source: crate::pinecone_ops::ContentSource {
                source_id: "j_1".into(),
                job_id: "j".into(),
                url: "https://x.io".into(),
                title: "X".into(),
                content_preview: "body".into(),
                credibility_score: 0.5,
                scraped_at: "now".into(),
                content_length: 4,
                source_type: "web_article".into(),
            },
            relevance_score: 0.87654,
        };
        assert_eq!(
            format_context(&[scored]),
            "Relevant context:\n\nSource 1: X\nURL: https://x.io\nContent: body\nRelevance: 0.877\n\n"
        );
    }
}
