//! Agent tools
//!
//! Each tool is exposed to the model as an OpenAI-style function. The
//! registry resolves calls by name and turns failures into text the model
//! can read, so one bad call does not abort the run.

pub mod rag;
pub mod scraper;
pub mod web_search;

pub use rag::RagTool;
pub use scraper::WebScraperTool;
pub use web_search::WebSearchTool;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::ResearchContext;
use crate::types::{AppError, AppResult, ToolCall, ToolSpec};

#[async_trait]
pub trait Tool: Send + Sync {
    /// Function name the model calls
    fn name(&self) -> &str;

    /// Human-readable name used in logs and prompts
    fn display_name(&self) -> &str;

    fn describe(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;

    async fn invoke(&self, args: Value, ctx: &ResearchContext) -> AppResult<String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.describe().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.display_name())
            .collect()
    }

    /// Function specs in registration order
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
            .collect()
    }

    pub async fn invoke(&self, name: &str, args: Value, ctx: &ResearchContext) -> AppResult<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AppError::InvalidRequest(format!("Unknown tool: {}", name)))?;
        tool.invoke(args, ctx).await
    }

    /// Run one model-issued call; errors come back as text for the model.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ResearchContext) -> String {
        let args = if call.arguments.trim().is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(&call.arguments)
        };

        let result = match args {
            Ok(args) => self.invoke(&call.name, args, ctx).await,
            Err(e) => Err(AppError::Parsing(format!("Invalid arguments for {}: {}", call.name, e))),
        };

        match result {
            Ok(output) => {
                debug!(tool = %call.name, bytes = output.len(), "Tool call finished");
                output
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                format!("Error: {}", e)
            }
        }
    }
}

/// Required string argument
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> AppResult<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::InvalidRequest(format!("Missing required argument '{}'", key)))
}

/// Optional positive integer argument; models sometimes send numbers as strings
pub(crate) fn optional_usize(args: &Value, key: &str) -> Option<usize> {
    let value = match args.get(key)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    value.filter(|n| *n > 0)
}
