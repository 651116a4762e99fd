//! Search Module
//!
//! Google web search through SerpAPI, used by the web search tool.

pub mod serpapi;

pub use serpapi::{format_results, SearchBackend, SearchError, SearchHit, SerpApiClient};
