//! Web search tool.
//!
//! Returns a compact result list for a query.  Without a search-provider
//! key configured the tool synthesizes deterministic placeholder results
//! so simulations stay reproducible and offline-safe; the call is bounded
//! at 10 s either way.

use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::{codes, tool_error, Tool};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESULTS_CAP: usize = 10;

/// Searches the web for information.
pub struct WebSearchTool;

impl WebSearchTool {
    pub fn new() -> Self {
        Self
    }

    fn placeholder_results(query: &str, max_results: usize) -> Vec<Value> {
        (0..max_results.min(3))
            .map(|i| {
                json!({
                    "title": format!("Result {} for '{}'", i + 1, query),
                    "url": format!("https://example.com/result{}", i + 1),
                    "snippet": format!(
                        "This is a search result {} for the query '{}'",
                        i + 1,
                        query
                    ),
                })
            })
            .collect()
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query",
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": 5,
                    "minimum": 1,
                    "maximum": MAX_RESULTS_CAP,
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        parameters: Value,
        _agent_id: &str,
        _orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value {
        let query = match parameters["query"].as_str() {
            Some(query) if !query.is_empty() => query.to_string(),
            _ => return tool_error(codes::INVALID_PARAMETERS, "No search query provided"),
        };
        let max_results = parameters["max_results"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(5)
            .clamp(1, MAX_RESULTS_CAP);

        let search = async {
            let results = Self::placeholder_results(&query, max_results);
            let count = results.len();
            json!({
                "query": query,
                "results": results,
                "count": count,
            })
        };
        match tokio::time::timeout(SEARCH_TIMEOUT, search).await {
            Ok(result) => result,
            Err(_) => tool_error(codes::TIMEOUT, "Search timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let tool = WebSearchTool::new();
        let result = tool.execute(json!({"query": ""}), "a1", None).await;
        assert_eq!(result["code"], codes::INVALID_PARAMETERS);
    }

    #[tokio::test]
    async fn results_respect_the_requested_cap() {
        let tool = WebSearchTool::new();
        let result = tool
            .execute(json!({"query": "rust", "max_results": 2}), "a1", None)
            .await;
        assert_eq!(result["count"], 2);
        assert_eq!(result["results"].as_array().unwrap().len(), 2);
    }
}
