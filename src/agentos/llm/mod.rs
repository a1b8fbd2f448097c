//! Provider-agnostic LLM adapters.
//!
//! The whole system talks to language models through one seam: the
//! [`LlmClient`] trait.  A call takes a prompt and the per-call
//! [`LlmConfig`](crate::agentos::config::LlmConfig) and returns
//! `(text, input_tokens, output_tokens)`.  Adapters **never** surface
//! transport errors to the agent engine: any rate-limit, API, or network
//! failure yields a well-formed fallback action string with zero token
//! counts, and the agent treats it like any other thought.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentos::agentos::llm::client_for_provider;
//! use agentos::LlmConfig;
//!
//! # async {
//! let client = client_for_provider("deepseek").unwrap();
//! let (text, input_tokens, output_tokens) =
//!     client.call("Reply with a JSON object.", &LlmConfig::default()).await;
//! # };
//! ```

pub mod openai_compatible;

use crate::agentos::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

pub use openai_compatible::OpenAiCompatibleClient;

/// Errors raised while constructing a client (never while calling one).
#[derive(Debug, Clone)]
pub enum LlmError {
    /// No adapter exists for the requested provider key.
    UnsupportedProvider(String),
    /// The provider's API key environment variable is not set.
    MissingApiKey(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::UnsupportedProvider(p) => write!(f, "Unsupported LLM provider: {}", p),
            LlmError::MissingApiKey(var) => {
                write!(f, "{} environment variable not set", var)
            }
        }
    }
}

impl Error for LlmError {}

/// Unified interface to a language-model provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send `prompt` and return `(text, input_tokens, output_tokens)`.
    ///
    /// Implementations must not error: failures are reported in-band as
    /// the [`fallback_action`] string with zero token counts.
    async fn call(&self, prompt: &str, cfg: &LlmConfig) -> (String, usize, usize);
}

/// Build the well-formed action object an adapter returns on failure.
///
/// The string parses like any other LLM thought, so the agent engine
/// needs no special casing for provider outages.
pub fn fallback_action(reason: &str) -> String {
    // Single quotes keep the reason from breaking the JSON envelope.
    let sanitized = reason.replace('"', "'");
    format!(
        "{{\"reasoning\": \"{}\", \"action\": \"FAIL\"}}",
        sanitized
    )
}

/// Provider table: key env var and OpenAI-compatible base URL per provider.
fn provider_entry(provider: &str) -> Option<(&'static str, &'static str)> {
    match provider {
        "openai" => Some(("OPENAI_API_KEY", "https://api.openai.com/v1")),
        "deepseek" => Some(("DEEPSEEK_API_KEY", "https://api.deepseek.com/v1")),
        "kimi" => Some(("KIMI_API_KEY", "https://api.moonshot.cn/v1")),
        "groq" => Some(("GROQ_API_KEY", "https://api.groq.com/openai/v1")),
        _ => None,
    }
}

/// Env var holding the API key for `provider`, if the provider is known.
pub fn api_key_var(provider: &str) -> Option<&'static str> {
    provider_entry(provider).map(|(var, _)| var)
}

/// Instantiate the adapter for a provider name.
///
/// All supported providers expose an OpenAI-compatible chat surface, so
/// they share one wire implementation and differ only in base URL and
/// key.
pub fn client_for_provider(provider: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
    let provider = provider.to_lowercase();
    let (key_var, base_url) = provider_entry(&provider)
        .ok_or_else(|| LlmError::UnsupportedProvider(provider.clone()))?;
    let api_key =
        std::env::var(key_var).map_err(|_| LlmError::MissingApiKey(key_var.to_string()))?;
    Ok(Arc::new(OpenAiCompatibleClient::new(&api_key, base_url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_action_is_valid_json_with_fail_action() {
        let text = fallback_action("rate limit \"exceeded\"");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["action"], "FAIL");
        assert!(value["reasoning"].as_str().unwrap().contains("rate limit"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(matches!(
            client_for_provider("carrier-pigeon"),
            Err(LlmError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn known_providers_have_key_vars() {
        for provider in &["openai", "deepseek", "kimi", "groq"] {
            assert!(api_key_var(provider).is_some());
        }
        assert!(api_key_var("other").is_none());
    }
}
