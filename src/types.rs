// Type definitions and enums

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    Groq,
    OpenAI,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Groq => write!(f, "groq"),
            LLMProvider::OpenAI => write!(f, "openai"),
        }
    }
}

impl LLMProvider {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "groq" => Some(LLMProvider::Groq),
            "openai" => Some(LLMProvider::OpenAI),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
    /// Functions the model may call; empty disables tool calling
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

/// A function exposed to the model through the chat-completions `tools` field
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments exactly as the model produced them
    pub arguments: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system", "tool"
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Assistant turn that only requests tool calls
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Result of a tool call, answered back to the model
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Coarse error categories used for logging, job bookkeeping and user messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "network_error")]
    Network,
    #[serde(rename = "api_error")]
    Api,
    #[serde(rename = "parsing_error")]
    Parsing,
    #[serde(rename = "pinecone_error")]
    VectorStore,
    #[serde(rename = "agent_error")]
    Agent,
    #[serde(rename = "timeout_error")]
    Timeout,
    #[serde(rename = "embedding_error")]
    Embedding,
    #[serde(rename = "unknown_error")]
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Api => "api_error",
            ErrorKind::Parsing => "parsing_error",
            ErrorKind::VectorStore => "pinecone_error",
            ErrorKind::Agent => "agent_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Embedding => "embedding_error",
            ErrorKind::Unknown => "unknown_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Search API error: {0}")]
    Search(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Invalid response from LLM call - None or empty: {0}")]
    EmptyResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Network(_) => ErrorKind::Network,
            AppError::LLMApi(_) | AppError::Search(_) | AppError::RateLimited(_) => ErrorKind::Api,
            AppError::Parsing(_) => ErrorKind::Parsing,
            AppError::VectorStore(_) => ErrorKind::VectorStore,
            AppError::Embedding(_) => ErrorKind::Embedding,
            AppError::Agent(_) | AppError::EmptyResponse(_) => ErrorKind::Agent,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::Config(_)
            | AppError::Auth(_)
            | AppError::NotFound(_)
            | AppError::InvalidRequest(_)
            | AppError::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// Variant name, reported as `exception_type` for errors without a known kind
    pub fn variant_name(&self) -> &'static str {
        match self {
            AppError::Network(_) => "Network",
            AppError::LLMApi(_) => "LLMApi",
            AppError::Search(_) => "Search",
            AppError::Parsing(_) => "Parsing",
            AppError::VectorStore(_) => "VectorStore",
            AppError::Embedding(_) => "Embedding",
            AppError::Agent(_) => "Agent",
            AppError::RateLimited(_) => "RateLimited",
            AppError::EmptyResponse(_) => "EmptyResponse",
            AppError::Timeout(_) => "Timeout",
            AppError::Config(_) => "Config",
            AppError::Auth(_) => "Auth",
            AppError::NotFound(_) => "NotFound",
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::Internal(_) => "Internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Network(_)
            | AppError::LLMApi(_)
            | AppError::Search(_)
            | AppError::VectorStore(_)
            | AppError::EmptyResponse(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else if err.is_decode() {
            AppError::Parsing(err.to_string())
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parsing(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": kind,
            "user_message": crate::utils::user_friendly_message(kind),
        });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AppError::Network("x".into()).kind(), ErrorKind::Network);
        assert_eq!(AppError::RateLimited("x".into()).kind(), ErrorKind::Api);
        assert_eq!(AppError::EmptyResponse("x".into()).kind(), ErrorKind::Agent);
        assert_eq!(AppError::VectorStore("x".into()).kind(), ErrorKind::VectorStore);
        assert_eq!(AppError::Embedding("x".into()).kind(), ErrorKind::Embedding);
        assert_eq!(AppError::Internal("x".into()).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_error_kind_serializes_as_tag() {
        let json = serde_json::to_string(&ErrorKind::VectorStore).unwrap();
        assert_eq!(json, "\"pinecone_error\"");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout_error");
    }

    #[test]
    fn test_provider_ids() {
        assert_eq!(LLMProvider::from_id("groq"), Some(LLMProvider::Groq));
        assert_eq!(LLMProvider::from_id("openai"), Some(LLMProvider::OpenAI));
        assert_eq!(LLMProvider::from_id("anthropic"), None);
        assert_eq!(LLMProvider::Groq.to_string(), "groq");
    }

    #[test]
    fn test_tool_result_message() {
        let msg = LLMMessage::tool_result("call_1", "done");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        let json = serde_json::to_value(&LLMMessage::user("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
    }
}
