// OpenAI-compatible chat-completions adapter
// Serves Groq (https://api.groq.com/openai/v1) and OpenAI (https://api.openai.com/v1)
// API Reference: https://console.groq.com/docs/api-reference#chat-create

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, TokenUsage, ToolCall, ToolSpec};

pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Chat-completions client for any OpenAI-compatible base URL
pub struct OpenAiCompatAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    // null is allowed for assistant turns that only carry tool calls
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

// Response types
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAiCompatAdapter {
    /// `base_url` is the API root without `/chat/completions`
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn convert_message(msg: &LLMMessage) -> WireMessage {
        let content = if msg.role == "assistant" && !msg.tool_calls.is_empty() && msg.content.is_empty() {
            None
        } else {
            Some(msg.content.clone())
        };

        WireMessage {
            role: msg.role.clone(),
            content,
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn convert_tool(tool: &ToolSpec) -> WireTool<'_> {
        WireTool {
            kind: "function",
            function: WireFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        }
    }

    fn api_error(status: StatusCode, body: &str) -> AppError {
        let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
        let message = parsed
            .as_ref()
            .map(|e| e.error.message.clone())
            .unwrap_or_else(|| body.to_string());
        let rate_limit_code = parsed
            .as_ref()
            .and_then(|e| e.error.code.as_ref())
            .and_then(|c| c.as_str())
            .map_or(false, |c| c == "rate_limit_exceeded");

        if status == StatusCode::TOO_MANY_REQUESTS || rate_limit_code {
            AppError::RateLimited(message)
        } else {
            AppError::LLMApi(format!("API error ({}): {}", status, message))
        }
    }
}

#[async_trait]
impl LLMAdapter for OpenAiCompatAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(Self::convert_message(&LLMMessage::system(system.clone())));
        }
        messages.extend(request.messages.iter().map(Self::convert_message));

        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools.iter().map(Self::convert_tool).collect(),
            tool_choice: if request.tools.is_empty() { None } else { Some("auto") },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::api_error(status, &error_text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Parsing(format!("Failed to parse chat completion: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmptyResponse("no choices returned".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        let content = choice.message.content.unwrap_or_default();

        if content.trim().is_empty() && tool_calls.is_empty() {
            return Err(AppError::EmptyResponse(format!("model {} returned no content", request.model)));
        }

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();
        debug!(model = %request.model, total_tokens = usage.total_tokens, tool_calls = tool_calls.len(), "Chat completion finished");

        Ok(LLMResponse {
            content,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn request(tools: Vec<ToolSpec>) -> LLMRequest {
        LLMRequest {
            model: "llama-3.1-8b-instant".to_string(),
            messages: vec![LLMMessage::user("Summarize rust async")],
            max_tokens: Some(2048),
            temperature: Some(0.5),
            system_instruction: Some("You are a researcher".to_string()),
            tools,
        }
    }

    fn adapter(server: &mockito::Server) -> OpenAiCompatAdapter {
        OpenAiCompatAdapter::new("gsk-test", &server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_plain_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer gsk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama-3.1-8b-instant",
                "messages": [
                    {"role": "system", "content": "You are a researcher"},
                    {"role": "user", "content": "Summarize rust async"}
                ],
                "max_tokens": 2048
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "# Report"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let response = adapter(&server).create_chat_completion(&request(vec![])).await.unwrap();
        assert_eq!(response.content, "# Report");
        assert_eq!(response.usage.total_tokens, 15);
        assert!(response.tool_calls.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_tool_calls_are_parsed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "tools": [{"type": "function", "function": {"name": "web_search"}}],
                "tool_choice": "auto"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "id": "call_1",
                                "type": "function",
                                "function": {"name": "web_search", "arguments": "{\"query\":\"rust\"}"}
                            }]
                        },
                        "finish_reason": "tool_calls"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let tools = vec![ToolSpec {
            name: "web_search".to_string(),
            description: "Search the web".to_string(),
            parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }];
        let response = adapter(&server).create_chat_completion(&request(tools)).await.unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "web_search");
        assert_eq!(response.tool_calls[0].arguments, "{\"query\":\"rust\"}");
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "Rate limit reached for model", "type": "tokens", "code": "rate_limit_exceeded"}}"#)
            .create_async()
            .await;

        let err = adapter(&server).create_chat_completion(&request(vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited(ref m) if m.contains("Rate limit reached")));
    }

    #[tokio::test]
    async fn test_other_errors_are_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "Invalid API Key", "code": "invalid_api_key"}}"#)
            .create_async()
            .await;

        let err = adapter(&server).create_chat_completion(&request(vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::LLMApi(ref m) if m.contains("Invalid API Key")));
    }

    #[tokio::test]
    async fn test_empty_content_is_empty_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": ""}, "finish_reason": "stop"}]}"#)
            .create_async()
            .await;

        let err = adapter(&server).create_chat_completion(&request(vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyResponse(_)));
    }

    #[test]
    fn test_tool_only_assistant_turn_has_null_content() {
        let msg = LLMMessage::assistant_tool_calls(
            "",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "web_search".to_string(),
                arguments: "{}".to_string(),
            }],
        );
        let wire = serde_json::to_value(OpenAiCompatAdapter::convert_message(&msg)).unwrap();
        assert!(wire["content"].is_null());
        assert_eq!(wire["tool_calls"][0]["type"], "function");
    }
}
