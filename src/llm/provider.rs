use std::time::Duration;

use async_trait::async_trait;

use crate::llm::openai_compat::{OpenAiCompatAdapter, GROQ_API_BASE, OPENAI_API_BASE};
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for one LLM provider
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
    /// Overrides the provider's default API base
    pub base_url: Option<String>,
    pub timeout: Duration,
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> AppResult<Self> {
        let kind = LLMProvider::from_id(&provider.name)
            .ok_or_else(|| AppError::Config(format!("Unsupported provider: {}", provider.name)))?;
        if provider.api_key.trim().is_empty() {
            return Err(AppError::Config(format!("Missing API key for provider {}", kind)));
        }

        let default_base = match kind {
            LLMProvider::Groq => GROQ_API_BASE,
            LLMProvider::OpenAI => OPENAI_API_BASE,
        };
        let base_url = provider.base_url.as_deref().unwrap_or(default_base);
        let adapter = OpenAiCompatAdapter::new(&provider.api_key, base_url, provider.timeout)?;

        Ok(Self {
            adapter: Box::new(adapter),
            provider_name: kind.to_string(),
        })
    }

    /// Wrap an existing adapter (scripted models in tests)
    pub fn with_adapter(provider_name: impl Into<String>, adapter: Box<dyn LLMAdapter>) -> Self {
        Self {
            adapter,
            provider_name: provider_name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, key: &str) -> LLMProviderConfig {
        LLMProviderConfig {
            name: name.to_string(),
            api_key: key.to_string(),
            base_url: None,
            timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_known_providers() {
        assert_eq!(LLM::new(config("groq", "gsk")).unwrap().provider_name(), "groq");
        assert_eq!(LLM::new(config("openai", "sk")).unwrap().provider_name(), "openai");
    }

    #[test]
    fn test_unsupported_provider_is_config_error() {
        assert!(matches!(LLM::new(config("anthropic", "k")), Err(AppError::Config(_))));
        assert!(matches!(LLM::new(config("groq", " ")), Err(AppError::Config(_))));
    }
}
