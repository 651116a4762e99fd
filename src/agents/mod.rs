//! Research Orchestrator
//!
//! Runs the configured crew for one topic and keeps the job record in step
//! with the outcome.
//!
//! ```text
//! create job (pending)
//!      │
//!      ▼
//! ┌─────────────┐   rate limited / empty answer
//! │  attempt n  │ ──────────────────────────────┐
//! │  (kickoff)  │ ◄── cooldown ─────────────────┘  (n < max_attempts)
//! └─────────────┘
//!      │ ok                     │ fatal / exhausted
//!      ▼                        ▼
//!  job complete             job error
//! ```

pub mod crew;

pub use crew::{AgentDefinition, CrewConfig, ModelSettings, ResearchCrew, TaskDefinition};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;
use crate::llm::{LLMProviderConfig, LLM};
use crate::models::{AppState, JobKind, ResearchContext, ResearchRequest, ResearchResponse};
use crate::pinecone_ops::jobs::DEFAULT_USER;
use crate::pinecone_ops::{JobStatus, JobUpdate, PineconeOperations};
use crate::search::{SearchBackend, SerpApiClient};
use crate::tools::{RagTool, ToolRegistry, WebScraperTool, WebSearchTool};
use crate::types::{AppError, AppResult};
use crate::utils::{ErrorHandler, Pacer};

#[async_trait]
pub trait Crew: Send + Sync {
    /// Run every task once and return the final task's output.
    async fn kickoff(&self, ctx: &ResearchContext) -> AppResult<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_cooldown: Duration,
    /// Tokens reserved from the throttle before each attempt
    pub tokens_per_attempt: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_cooldown: Duration::from_secs(60),
            tokens_per_attempt: 3000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_cooldown: Duration::from_secs(config.retry_cooldown_secs),
            tokens_per_attempt: config.tokens_per_attempt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Fatal,
}

/// Markers of transient failures in provider messages that reach us untyped
const RETRYABLE_MARKERS: [&str; 4] = ["rate_limit", "ratelimit", "none or empty", "invalid response"];

pub fn classify_failure(err: &AppError) -> FailureClass {
    match err {
        AppError::RateLimited(_) | AppError::EmptyResponse(_) => FailureClass::Retryable,
        AppError::LLMApi(msg) | AppError::Agent(msg) => {
            let msg = msg.to_lowercase();
            if RETRYABLE_MARKERS.iter().any(|marker| msg.contains(marker)) {
                FailureClass::Retryable
            } else {
                FailureClass::Fatal
            }
        }
        _ => FailureClass::Fatal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    FailedRetryable,
    FailedFatal,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::FailedRetryable => "failed_retryable",
            RunState::FailedFatal => "failed_fatal",
        };
        f.write_str(name)
    }
}

/// Kick off the crew with pacing and bounded retries. The last error is
/// returned once attempts are exhausted.
pub async fn run_research(
    crew: &dyn Crew,
    ctx: &ResearchContext,
    pacer: &dyn Pacer,
    policy: &RetryPolicy,
) -> AppResult<String> {
    let max_attempts = policy.max_attempts.max(1);
    let mut state = RunState::Idle;
    let mut attempt = 1;

    loop {
        let waited = pacer.acquire(policy.tokens_per_attempt).await?;
        state = transition(state, RunState::Running, ctx, attempt);
        info!(topic = %ctx.topic, attempt, max_attempts, waited_secs = waited.as_secs_f64(), "Crew attempt started");

        let err = match crew.kickoff(ctx).await {
            Ok(report) => {
                transition(state, RunState::Succeeded, ctx, attempt);
                return Ok(report);
            }
            Err(err) => err,
        };

        if classify_failure(&err) == FailureClass::Fatal {
            transition(state, RunState::FailedFatal, ctx, attempt);
            return Err(err);
        }
        state = transition(state, RunState::FailedRetryable, ctx, attempt);

        if attempt >= max_attempts {
            error!(topic = %ctx.topic, attempts = attempt, error = %err, "Crew failed after all retry attempts");
            return Err(err);
        }

        warn!(
            topic = %ctx.topic,
            attempt,
            cooldown_secs = policy.retry_cooldown.as_secs(),
            error = %err,
            "Transient crew failure, retrying after cooldown"
        );
        pacer.cooldown(policy.retry_cooldown).await;
        attempt += 1;
    }
}

fn transition(from: RunState, to: RunState, ctx: &ResearchContext, attempt: u32) -> RunState {
    tracing::debug!(job_id = ?ctx.job_id, attempt, from = %from, to = %to, "Run state changed");
    to
}

fn request_key(from_request: Option<&str>, configured: Option<String>) -> Option<String> {
    from_request
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or(configured)
}

/// Handle one research request end to end. Keys in the request take
/// precedence over the environment.
pub async fn execute_research_pipeline(state: &AppState, request: ResearchRequest) -> AppResult<ResearchResponse> {
    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(AppError::InvalidRequest("Topic must not be empty".to_string()));
    }

    let llm_config = &state.config.llm;
    let llm_key = request_key(request.groq_api_key.as_deref(), llm_config.active_api_key())
        .ok_or_else(|| AppError::InvalidRequest("Groq API key is required".to_string()))?;
    let serpapi_key = request_key(request.serpapi_api_key.as_deref(), state.config.search.serpapi_key.clone())
        .ok_or_else(|| AppError::InvalidRequest("SerpAPI key is required".to_string()))?;

    let llm = LLM::new(LLMProviderConfig {
        name: llm_config.default_provider.clone(),
        api_key: llm_key,
        base_url: llm_config.base_url.clone(),
        timeout: Duration::from_secs(llm_config.request_timeout_secs),
    })?;
    let search = SerpApiClient::new(serpapi_key)?;
    let ops = state.operations(request.pinecone_api_key.as_deref()).await?;

    let user_id = request
        .user_id
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(DEFAULT_USER);

    run_pipeline(state, &ops, Arc::new(llm), Arc::new(search), topic, user_id).await
}

/// Create the job, run the crew and record the outcome on the job.
pub async fn run_pipeline(
    state: &AppState,
    ops: &PineconeOperations,
    llm: Arc<LLM>,
    search: Arc<dyn SearchBackend>,
    topic: &str,
    user_id: &str,
) -> AppResult<ResearchResponse> {
    let handle = ops.create_research_job(topic, user_id).await?;
    let ctx = ResearchContext::for_job(&handle.job_id, topic, user_id);
    info!(job_id = %handle.job_id, topic = %topic, user_id = %user_id, provider = %llm.provider_name(), "Research job started");

    let started = Instant::now();
    let outcome = match build_crew(state, ops, llm, search, topic) {
        Ok(crew) => {
            let policy = RetryPolicy::from_config(&state.config.orchestrator);
            run_research(&crew, &ctx, state.pacer.as_ref(), &policy).await
        }
        Err(e) => Err(e),
    };
    let elapsed = started.elapsed().as_secs_f64();

    match outcome {
        Ok(report) => {
            let source_count = ctx.sources_stored() as u64;
            let update = JobUpdate::complete(report.clone())
                .with_source_count(source_count)
                .with_processing_time(elapsed);
            if !ops.update_research_job(&handle.job_id, update).await {
                warn!(job_id = %handle.job_id, "Completed job could not be updated");
            }
            info!(job_id = %handle.job_id, source_count, elapsed_secs = elapsed, "Research job complete");

            Ok(ResearchResponse {
                job_id: handle.job_id,
                namespace: handle.namespace,
                status: JobStatus::Complete,
                report: Some(report),
                error: None,
                user_message: None,
                source_count,
                processing_time_seconds: elapsed,
            })
        }
        Err(err) => {
            let handler = ErrorHandler::new().register(JobKind::Research, Arc::new(ops.jobs().clone()));
            let failure = handler.handle_error(&handle.job_id, ctx.kind, &err).await;

            Ok(ResearchResponse {
                job_id: handle.job_id,
                namespace: handle.namespace,
                status: JobStatus::Error,
                report: None,
                user_message: Some(failure.user_message().to_string()),
                error: Some(failure.message),
                source_count: ctx.sources_stored() as u64,
                processing_time_seconds: elapsed,
            })
        }
    }
}

fn build_crew(
    state: &AppState,
    ops: &PineconeOperations,
    llm: Arc<LLM>,
    search: Arc<dyn SearchBackend>,
    topic: &str,
) -> AppResult<ResearchCrew> {
    let web_search = WebSearchTool::new(search, state.config.search.max_results).with_content(ops.content().clone());
    let registry = ToolRegistry::new()
        .with(Arc::new(web_search))
        .with(Arc::new(WebScraperTool))
        .with(Arc::new(RagTool::new(ops.clone())));

    let settings = ModelSettings {
        model: state.config.llm.default_model.clone(),
        temperature: state.config.llm.temperature,
        max_tokens: state.config.llm.max_tokens,
    };

    ResearchCrew::build(
        &state.crew_config,
        topic,
        &registry,
        llm,
        settings,
        &state.config.orchestrator.reports_dir,
    )
}

#[cfg(test)]
mod tests {
    use super::crew::testing::{text, tool_call, ScriptedModel};
    use super::*;
    use crate::config::{Config, VectorBackend};
    use crate::embeddings::HashEmbedder;
    use crate::search::SearchError;
    use crate::utils::throttle::testing::fake_throttle;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FlakyCrew {
        outcomes: Mutex<VecDeque<AppResult<String>>>,
        kickoffs: Mutex<u32>,
    }

    impl FlakyCrew {
        fn new(outcomes: Vec<AppResult<String>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                kickoffs: Mutex::new(0),
            }
        }

        fn kickoffs(&self) -> u32 {
            *self.kickoffs.lock().unwrap()
        }
    }

    #[async_trait]
    impl Crew for FlakyCrew {
        async fn kickoff(&self, _ctx: &ResearchContext) -> AppResult<String> {
            *self.kickoffs.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("report".to_string()))
        }
    }

    fn rate_limited() -> AppResult<String> {
        Err(AppError::RateLimited("Rate limit reached for model".to_string()))
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(classify_failure(&AppError::RateLimited("x".into())), FailureClass::Retryable);
        assert_eq!(classify_failure(&AppError::EmptyResponse("x".into())), FailureClass::Retryable);
        assert_eq!(
            classify_failure(&AppError::LLMApi("code: rate_limit_exceeded".into())),
            FailureClass::Retryable
        );
        assert_eq!(
            classify_failure(&AppError::Agent("Invalid response from LLM call - None or empty".into())),
            FailureClass::Retryable
        );
        assert_eq!(classify_failure(&AppError::LLMApi("API error (401): bad key".into())), FailureClass::Fatal);
        assert_eq!(classify_failure(&AppError::Network("reset".into())), FailureClass::Fatal);
    }

    #[tokio::test]
    async fn test_two_rate_limits_stop_after_max_attempts() {
        let (throttle, sleeper) = fake_throttle(6000);
        let crew = FlakyCrew::new(vec![rate_limited(), rate_limited(), Ok("never".to_string())]);
        let ctx = ResearchContext::new("rust", "u");

        let err = run_research(&crew, &ctx, &throttle, &RetryPolicy::default()).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited(_)));
        assert_eq!(crew.kickoffs(), 2);
        // one cooldown between the attempts, none after the last
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_success_after_one_rate_limit() {
        let (throttle, sleeper) = fake_throttle(6000);
        let crew = FlakyCrew::new(vec![rate_limited(), Ok("# Report".to_string())]);
        let ctx = ResearchContext::new("rust", "u");

        let report = run_research(&crew, &ctx, &throttle, &RetryPolicy::default()).await.unwrap();
        assert_eq!(report, "# Report");
        assert_eq!(crew.kickoffs(), 2);
        assert_eq!(sleeper.total(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let (throttle, sleeper) = fake_throttle(6000);
        let crew = FlakyCrew::new(vec![Err(AppError::VectorStore("index gone".into()))]);
        let ctx = ResearchContext::new("rust", "u");

        let err = run_research(&crew, &ctx, &throttle, &RetryPolicy::default()).await.unwrap_err();
        assert!(matches!(err, AppError::VectorStore(_)));
        assert_eq!(crew.kickoffs(), 1);
        assert!(sleeper.calls().is_empty());
    }

    struct FakeSearch;

    #[async_trait]
    impl SearchBackend for FakeSearch {
        async fn search(&self, _query: &str, _num: usize) -> Result<Value, SearchError> {
            Ok(json!({
                "organic_results": [
                    {"position": 1, "title": "Tokio", "link": "https://tokio.rs", "snippet": "An async runtime"},
                    {"position": 2, "title": "Async book", "link": "https://rust-lang.github.io/async-book", "snippet": "Futures explained"}
                ]
            }))
        }
    }

    async fn memory_state(reports_dir: &std::path::Path) -> (AppState, PineconeOperations) {
        let mut config = Config::default();
        config.pinecone.backend = VectorBackend::Memory;
        config.orchestrator.reports_dir = reports_dir.to_path_buf();
        let (throttle, _sleeper) = fake_throttle(config.orchestrator.tokens_per_minute);

        let state = AppState::new(
            config,
            Arc::new(HashEmbedder::new(384)),
            Arc::new(throttle),
            CrewConfig::embedded().unwrap(),
        );
        let ops = state.operations(None).await.unwrap();
        (state, ops)
    }

    #[tokio::test]
    async fn test_pipeline_completes_job() {
        let dir = tempfile::tempdir().unwrap();
        let (state, ops) = memory_state(dir.path()).await;
        let model = ScriptedModel::new(vec![
            tool_call("web_search", r#"{"query": "rust async"}"#),
            text("# Rust Async\n\nSources: https://tokio.rs"),
        ]);

        let response = run_pipeline(&state, &ops, model.llm(), Arc::new(FakeSearch), "rust async", "alice")
            .await
            .unwrap();

        assert_eq!(response.status, JobStatus::Complete);
        assert_eq!(response.namespace, format!("job_{}", response.job_id));
        assert_eq!(response.source_count, 2);
        assert!(response.error.is_none());

        let job = ops.get_job(&response.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.report, "# Rust Async\n\nSources: https://tokio.rs");
        assert_eq!(job.source_count, 2);
        assert_eq!(job.user_id, "alice");
        assert_eq!(ops.content().get_job_sources(&response.job_id, 10).await.len(), 2);
        assert!(dir.path().join("report_rust_async.md").exists());
    }

    #[tokio::test]
    async fn test_pipeline_counts_distinct_sources() {
        let dir = tempfile::tempdir().unwrap();
        let (state, ops) = memory_state(dir.path()).await;
        let call = |id: &str| crate::types::ToolCall {
            id: id.to_string(),
            name: "web_search".to_string(),
            arguments: r#"{"query": "rust async"}"#.to_string(),
        };
        let repeated = Ok(crate::types::LLMResponse {
            content: String::new(),
            finish_reason: "tool_calls".to_string(),
            usage: Default::default(),
            tool_calls: vec![call("call_1"), call("call_2")],
        });
        let model = ScriptedModel::new(vec![repeated, text("# Report")]);

        let response = run_pipeline(&state, &ops, model.llm(), Arc::new(FakeSearch), "rust async", "alice")
            .await
            .unwrap();

        let stored = ops.content().get_job_sources(&response.job_id, 10).await.len();
        assert_eq!(stored, 2);
        assert_eq!(response.source_count, 2);
        let job = ops.get_job(&response.job_id).await.unwrap().unwrap();
        assert_eq!(job.source_count, 2);
    }

    #[tokio::test]
    async fn test_pipeline_marks_job_error() {
        let dir = tempfile::tempdir().unwrap();
        let (state, ops) = memory_state(dir.path()).await;
        let model = ScriptedModel::new(vec![Err(AppError::LLMApi("API error (401): Invalid API Key".into()))]);

        let response = run_pipeline(&state, &ops, model.llm(), Arc::new(FakeSearch), "rust async", "alice")
            .await
            .unwrap();

        assert_eq!(response.status, JobStatus::Error);
        assert!(response.error.as_deref().unwrap().contains("Invalid API Key"));
        assert_eq!(
            response.user_message.as_deref(),
            Some(crate::utils::user_friendly_message(crate::types::ErrorKind::Api))
        );

        let job = ops.get_job(&response.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error_message.contains("Invalid API Key"));
    }

    #[tokio::test]
    async fn test_missing_keys_rejected_before_job_creation() {
        let mut config = Config::default();
        config.pinecone.backend = VectorBackend::Memory;
        let (throttle, _) = fake_throttle(6000);
        let state = AppState::new(
            config,
            Arc::new(HashEmbedder::new(384)),
            Arc::new(throttle),
            CrewConfig::embedded().unwrap(),
        );

        let err = execute_research_pipeline(&state, ResearchRequest::new("rust")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = execute_research_pipeline(&state, ResearchRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
