use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pinecone: PineconeConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LLMConfig,
    pub search: SearchConfig,
    pub orchestrator: OrchestratorConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

/// Where job and content records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Hosted Pinecone indexes
    Pinecone,
    /// Process-local store, lost on restart
    Memory,
}

impl FromStr for VectorBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pinecone" => Ok(VectorBackend::Pinecone),
            "memory" => Ok(VectorBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown vector store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PineconeConfig {
    pub backend: VectorBackend,
    pub api_key: Option<String>,
    pub control_plane_url: String,
    pub api_version: String,
    pub jobs_index: String,
    pub content_index: String,
    pub cloud: String,
    pub region: String,
    pub metric: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (fastembed) or "hash"
    pub provider: String,
    pub model: String,
    pub dims: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub default_provider: String,
    pub default_model: String,
    /// Overrides the provider's API base (OpenAI-compatible)
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl LLMConfig {
    /// API key for the configured default provider
    pub fn active_api_key(&self) -> Option<String> {
        match self.default_provider.as_str() {
            "openai" => self.openai_api_key.clone(),
            _ => self.groq_api_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub serpapi_key: Option<String>,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    pub max_attempts: u32,
    pub retry_cooldown_secs: u64,
    /// LLM token quota per minute (Groq free tier: 6000)
    pub tokens_per_minute: u32,
    /// Tokens reserved from the quota before each attempt
    pub tokens_per_attempt: u32,
    pub agents_config: Option<PathBuf>,
    pub tasks_config: Option<PathBuf>,
    pub reports_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared password for the UI and API; `None` leaves them open
    pub ui_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
                cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            pinecone: PineconeConfig {
                backend: VectorBackend::Pinecone,
                api_key: None,
                control_plane_url: "https://api.pinecone.io".to_string(),
                api_version: "2024-07".to_string(),
                jobs_index: "cognito-jobs".to_string(),
                content_index: "cognito-content".to_string(),
                cloud: "aws".to_string(),
                region: "us-east-1".to_string(),
                metric: "cosine".to_string(),
            },
            embedding: EmbeddingConfig {
                provider: "local".to_string(),
                model: "all-minilm-l6-v2".to_string(),
                dims: 384,
            },
            llm: LLMConfig {
                groq_api_key: None,
                openai_api_key: None,
                default_provider: "groq".to_string(),
                default_model: "llama-3.1-8b-instant".to_string(),
                base_url: None,
                temperature: 0.5,
                max_tokens: 2048,
                request_timeout_secs: 120,
            },
            search: SearchConfig {
                serpapi_key: None,
                max_results: 5,
            },
            orchestrator: OrchestratorConfig {
                max_attempts: 2,
                retry_cooldown_secs: 60,
                tokens_per_minute: 6000,
                tokens_per_attempt: 3000,
                agents_config: None,
                tasks_config: None,
                reports_dir: PathBuf::from("."),
            },
            auth: AuthConfig { ui_password: None },
        }
    }
}

/// Reads an optional variable, treating empty values as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => Ok(raw.trim().parse()?),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        Ok(Self {
            server: ServerConfig {
                port: parsed("PORT", defaults.server.port)?,
                host: optional("HOST").unwrap_or(defaults.server.host),
                cors_allowed_origins: optional("ALLOWED_ORIGINS")
                    .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or(defaults.server.cors_allowed_origins),
            },
            pinecone: PineconeConfig {
                backend: match optional("VECTOR_STORE") {
                    Some(raw) => raw.parse()?,
                    None => defaults.pinecone.backend,
                },
                api_key: optional("PINECONE_API_KEY"),
                control_plane_url: optional("PINECONE_CONTROL_PLANE_URL")
                    .unwrap_or(defaults.pinecone.control_plane_url),
                api_version: optional("PINECONE_API_VERSION").unwrap_or(defaults.pinecone.api_version),
                jobs_index: optional("PINECONE_JOBS_INDEX").unwrap_or(defaults.pinecone.jobs_index),
                content_index: optional("PINECONE_CONTENT_INDEX").unwrap_or(defaults.pinecone.content_index),
                cloud: optional("PINECONE_CLOUD").unwrap_or(defaults.pinecone.cloud),
                region: optional("PINECONE_REGION").unwrap_or(defaults.pinecone.region),
                metric: defaults.pinecone.metric,
            },
            embedding: EmbeddingConfig {
                provider: optional("EMBEDDING_PROVIDER").unwrap_or(defaults.embedding.provider),
                model: optional("EMBEDDING_MODEL").unwrap_or(defaults.embedding.model),
                dims: parsed("EMBEDDING_DIMS", defaults.embedding.dims)?,
            },
            llm: LLMConfig {
                groq_api_key: optional("GROQ_API_KEY"),
                openai_api_key: optional("OPENAI_API_KEY"),
                default_provider: optional("LLM_PROVIDER").unwrap_or(defaults.llm.default_provider),
                default_model: optional("LLM_MODEL").unwrap_or(defaults.llm.default_model),
                base_url: optional("LLM_BASE_URL"),
                temperature: parsed("LLM_TEMPERATURE", defaults.llm.temperature)?,
                max_tokens: parsed("LLM_MAX_TOKENS", defaults.llm.max_tokens)?,
                request_timeout_secs: parsed("LLM_TIMEOUT_SECS", defaults.llm.request_timeout_secs)?,
            },
            search: SearchConfig {
                serpapi_key: optional("SERPAPI_API_KEY"),
                max_results: parsed("SEARCH_MAX_RESULTS", defaults.search.max_results)?,
            },
            orchestrator: OrchestratorConfig {
                max_attempts: parsed("AGENT_MAX_ATTEMPTS", defaults.orchestrator.max_attempts)?,
                retry_cooldown_secs: parsed("AGENT_RETRY_COOLDOWN_SECS", defaults.orchestrator.retry_cooldown_secs)?,
                tokens_per_minute: parsed("LLM_TOKENS_PER_MINUTE", defaults.orchestrator.tokens_per_minute)?,
                tokens_per_attempt: parsed("LLM_TOKENS_PER_ATTEMPT", defaults.orchestrator.tokens_per_attempt)?,
                agents_config: optional("AGENTS_CONFIG").map(PathBuf::from),
                tasks_config: optional("TASKS_CONFIG").map(PathBuf::from),
                reports_dir: optional("REPORTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.orchestrator.reports_dir),
            },
            auth: AuthConfig {
                ui_password: optional("UI_PASSWORD"),
            },
        })
    }
}
