//! Tavily web search tool
//!
//! Returns the content of the top result for a query.

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const NO_RESULTS: &str = "No results found.";

/// Tavily configuration; a missing key surfaces as a tool error per call
#[derive(Debug, Clone, Default)]
pub struct TavilyConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl TavilyConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("TAVILY_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            base_url: std::env::var("TAVILY_BASE_URL").ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    content: String,
}

pub struct TavilySearchTool {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl TavilySearchTool {
    pub fn new(config: TavilyConfig) -> Self {
        // Builder only fails without a TLS backend; fall back to defaults
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self {
            client,
            api_key: config.api_key,
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
        }
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "TAVILY_API_KEY is not set".to_string())?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&SearchRequest {
                query,
                search_depth: "basic",
                max_results: 1,
            })
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("status {status}: {body}"));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {e}"))?;

        Ok(parsed
            .results
            .into_iter()
            .next()
            .map_or_else(|| NO_RESULTS.to_string(), |r| r.content))
    }
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &'static str {
        "tavily_search"
    }

    fn description(&self) -> String {
        "Search the web for current information using Tavily search API.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input = match serde_json::from_value::<SearchInput>(input) {
            Ok(input) => input,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        tracing::debug!(thread_id = %ctx.thread_id, query = %input.query, "Running web search");

        match self.search(&input.query).await {
            Ok(content) => ToolOutput::success(content),
            Err(e) => {
                tracing::warn!(thread_id = %ctx.thread_id, error = %e, "Web search failed");
                ToolOutput::error(format!("Error searching: {e}"))
            }
        }
    }
}
