//! Wire client for OpenAI-compatible chat endpoints.
//!
//! Deepseek, Moonshot (Kimi), Groq, and OpenAI itself all expose the same
//! `/chat/completions` surface, so a single implementation covers every
//! supported provider.  Requests go through one shared, connection-pooled
//! [`reqwest::Client`]; keeping TLS sessions and DNS lookups warm matters
//! when a whole agent society is thinking concurrently.

use crate::agentos::config::LlmConfig;
use crate::agentos::llm::{fallback_action, LlmClient};
use async_trait::async_trait;
use lazy_static::lazy_static;
use serde_json::{json, Value};
use std::time::Duration;

lazy_static! {
    /// Shared HTTP client with persistent connection pooling.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = {
        reqwest::ClientBuilder::new()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build shared HTTP client")
    };
}

/// Borrow the lazily initialised shared [`reqwest::Client`].
pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// Client for any provider speaking the OpenAI chat-completions format.
pub struct OpenAiCompatibleClient {
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleClient {
    /// Create a client for the given key and base URL
    /// (e.g. `https://api.deepseek.com/v1`).
    pub fn new(api_key: &str, base_url: &str) -> Self {
        log::info!(
            target: "aos::llm",
            "Initialized OpenAI-compatible client for base URL: {}",
            base_url
        );
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn request(&self, prompt: &str, cfg: &LlmConfig) -> Result<(String, usize, usize), String> {
        let body = json!({
            "model": cfg.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a helpful assistant. Respond only in the requested JSON format."
                },
                {"role": "user", "content": prompt}
            ],
            "temperature": cfg.temperature,
            "max_completion_tokens": cfg.max_tokens,
        });

        let response = get_shared_http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(cfg.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {}", e))?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("no error detail");
            return Err(format!("API error ({}): {}", status, detail));
        }

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| "response carried no message content".to_string())?
            .to_string();
        let input_tokens = payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize;
        let output_tokens = payload["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize;
        Ok((text, input_tokens, output_tokens))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn call(&self, prompt: &str, cfg: &LlmConfig) -> (String, usize, usize) {
        // Outer wall clock: the per-request timeout plus slack, so an
        // unresponsive provider cannot stall the agent loop.
        let wall = cfg.timeout + Duration::from_secs(10);
        match tokio::time::timeout(wall, self.request(prompt, cfg)).await {
            Ok(Ok(result)) => result,
            Ok(Err(reason)) => {
                log::error!(
                    target: "aos::llm",
                    "LLM call to {} failed: {}",
                    cfg.model,
                    reason
                );
                (
                    fallback_action(&format!(
                        "An API error occurred with model {}: {}",
                        cfg.model, reason
                    )),
                    0,
                    0,
                )
            }
            Err(_) => {
                log::error!(
                    target: "aos::llm",
                    "LLM call to {} exceeded the outer wall of {:?}",
                    cfg.model,
                    wall
                );
                (
                    fallback_action(&format!(
                        "Provider for model {} did not respond in time.",
                        cfg.model
                    )),
                    0,
                    0,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = OpenAiCompatibleClient::new("k", "https://api.example.com/v1/");
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_fallback_action() {
        let client = OpenAiCompatibleClient::new("k", "http://127.0.0.1:1");
        let mut cfg = LlmConfig::default();
        cfg.timeout = Duration::from_millis(300);
        let (text, input_tokens, output_tokens) = client.call("hello", &cfg).await;
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["action"], "FAIL");
        assert_eq!(input_tokens, 0);
        assert_eq!(output_tokens, 0);
    }
}
