//! Built-in Tool Implementations
//!
//! Tools are the hands of an agent: sandboxed capabilities invoked from
//! the think/act loop.  Every tool implements the [`Tool`] trait and
//! returns a JSON result dictionary: success results carry
//! `"status": "success"`, failures carry `"error"` plus a stable
//! `"code"` so agents (and tests) can branch on the failure class
//! instead of parsing prose.
//!
//! # Available Tools
//!
//! - **web_search**: query the web for information
//! - **code_executor**: run a Python snippet in a subprocess with a
//!   wall-clock limit and output caps
//! - **file_manager**: read/write/list/deliver files inside the agent's
//!   sandboxed workspace (path-confined)
//! - **api_client**: GET/POST to external HTTP APIs, with private and
//!   loopback targets refused
//! - **messaging**: send a message to another agent's mailbox
//! - **pytest_runner**: run pytest on a test file inside the workspace
//!
//! Generated tools deployed by the forging protocol are wrapped by
//! [`plugin::PluginTool`] and discovered from manifest files at toolbox
//! init/refresh time.

pub mod api_client;
pub mod code_executor;
pub mod file_manager;
pub mod messaging;
pub mod plugin;
pub mod pytest_runner;
pub mod web_search;

use crate::agentos::orchestrator::Orchestrator;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub use api_client::ApiClientTool;
pub use code_executor::CodeExecutorTool;
pub use file_manager::FileManagerTool;
pub use messaging::MessagingTool;
pub use plugin::{PluginManifest, PluginTool};
pub use pytest_runner::PytestRunnerTool;
pub use web_search::WebSearchTool;

/// Stable error codes carried in tool result dictionaries.
pub mod codes {
    pub const INVALID_PARAMETERS: &str = "INVALID_PARAMETERS";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";
    pub const IS_A_DIRECTORY: &str = "IS_A_DIRECTORY";
    pub const DIRECTORY_NOT_FOUND: &str = "DIRECTORY_NOT_FOUND";
    pub const TOOL_NOT_FOUND: &str = "TOOL_NOT_FOUND";
    pub const EXECUTION_FAILED: &str = "EXECUTION_FAILED";
    pub const SECURITY_VALIDATION_FAILED: &str = "SECURITY_VALIDATION_FAILED";
    pub const DELIVERY_NOT_CONFIGURED: &str = "DELIVERY_NOT_CONFIGURED";
    pub const TIMEOUT: &str = "TIMEOUT";
}

/// Build a failure result dictionary.
pub fn tool_error(code: &str, message: impl Into<String>) -> Value {
    json!({"error": message.into(), "code": code})
}

/// An abstract capability available to agents through their toolbox.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a toolbox.
    fn name(&self) -> &str;

    /// One-line description surfaced to the LLM.
    fn description(&self) -> &str;

    /// JSON schema of the accepted parameters.
    fn schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// Tools never return `Err`: every failure is encoded in the result
    /// dictionary so the calling agent can recover locally.  The
    /// orchestrator reference is present for tools that need system
    /// services (messaging); most tools ignore it.
    async fn execute(
        &self,
        parameters: Value,
        agent_id: &str,
        orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value;
}
