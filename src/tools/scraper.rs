use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Tool};
use crate::models::ResearchContext;
use crate::types::AppResult;

/// Placeholder scraper; page fetching is not implemented.
pub struct WebScraperTool;

#[async_trait]
impl Tool for WebScraperTool {
    fn name(&self) -> &str {
        "web_scraper"
    }

    fn display_name(&self) -> &str {
        "Web Scraper Tool"
    }

    fn describe(&self) -> &str {
        "A dummy tool that simulates scraping a website."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Page to scrape"}
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: Value, _ctx: &ResearchContext) -> AppResult<String> {
        let url = required_str(&args, "url")?;
        Ok(format!(
            "Placeholder content for {}. This tool is not fully implemented yet.",
            url
        ))
    }
}
