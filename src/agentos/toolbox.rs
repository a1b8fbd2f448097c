//! Per-agent tool registry.
//!
//! Every agent owns a toolbox sandboxed to its workspace directory.  The
//! toolbox registers the built-in tool set from a declared list, then
//! discovers generated tools from JSON manifests in the plugins
//! directory.  A disabled-tools filter applies to everything except the
//! protected system tools, and the messaging tool is dropped when the
//! messaging capability is off.
//!
//! [`Toolbox::refresh`] re-runs discovery; it is idempotent, and the
//! orchestrator broadcasts it to every toolbox after deploying a freshly
//! forged plugin so all agents see the new tool.

use crate::agentos::config::PROTECTED_TOOLS;
use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::{
    codes, tool_error, ApiClientTool, CodeExecutorTool, FileManagerTool, MessagingTool,
    PluginManifest, PluginTool, PytestRunnerTool, Tool, WebSearchTool,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Dynamic registry of the tools one agent may invoke.
pub struct Toolbox {
    workspace_dir: PathBuf,
    delivery_dir: PathBuf,
    plugins_dir: PathBuf,
    disabled_tools: Vec<String>,
    messaging_enabled: bool,
    orchestrator: Weak<Orchestrator>,
    tools: Mutex<HashMap<String, Arc<dyn Tool>>>,
}

impl Toolbox {
    /// Build an empty toolbox; call [`Toolbox::initialize`] before use.
    pub fn new(
        workspace_dir: PathBuf,
        delivery_dir: PathBuf,
        plugins_dir: PathBuf,
        disabled_tools: Vec<String>,
        messaging_enabled: bool,
        orchestrator: Weak<Orchestrator>,
    ) -> Self {
        Self {
            workspace_dir,
            delivery_dir,
            plugins_dir,
            disabled_tools,
            messaging_enabled,
            orchestrator,
            tools: Mutex::new(HashMap::new()),
        }
    }

    fn is_disabled(&self, name: &str) -> bool {
        if PROTECTED_TOOLS.contains(&name) {
            return false;
        }
        self.disabled_tools.iter().any(|disabled| disabled == name)
    }

    /// Declared built-in tool set for this agent.
    fn builtin_tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(FileManagerTool::new(
                self.workspace_dir.clone(),
                Some(self.delivery_dir.clone()),
            )),
            Arc::new(WebSearchTool::new()),
            Arc::new(CodeExecutorTool::new()),
            Arc::new(ApiClientTool::new()),
            Arc::new(PytestRunnerTool::new(self.workspace_dir.clone())),
        ];
        if self.messaging_enabled {
            tools.push(Arc::new(MessagingTool::new()));
        }
        tools
    }

    /// Generated tools discovered from manifest files.
    fn plugin_tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        let entries = match std::fs::read_dir(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(_) => return tools,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|ext| ext == "json") != Some(true) {
                continue;
            }
            match PluginManifest::load(&path) {
                Ok(manifest) => {
                    tools.push(Arc::new(PluginTool::new(manifest, &self.plugins_dir)));
                }
                Err(e) => {
                    log::warn!(
                        target: "aos::toolbox",
                        "Skipping malformed plugin manifest {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
        tools
    }

    /// Populate the registry: built-ins first, then plugin discovery.
    pub async fn initialize(&self) {
        let mut registry: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        for tool in self.builtin_tools().into_iter().chain(self.plugin_tools()) {
            let name = tool.name().to_string();
            if self.is_disabled(&name) {
                log::debug!(target: "aos::toolbox", "Tool {} disabled by configuration", name);
                continue;
            }
            if registry.insert(name.clone(), tool).is_some() {
                log::warn!(target: "aos::toolbox", "Tool {} already exists, overwriting", name);
            }
        }
        let mut tools = self.tools.lock().await;
        *tools = registry;
        log::debug!(
            target: "aos::toolbox",
            "Toolbox initialized with {} tools for workspace {}",
            tools.len(),
            self.workspace_dir.display()
        );
    }

    /// Re-run discovery.  Repeated refreshes yield the same state.
    pub async fn refresh(&self) {
        self.initialize().await;
    }

    /// Names of every registered tool, sorted.
    pub async fn list_tools(&self) -> Vec<String> {
        let tools = self.tools.lock().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a tool is currently registered.
    pub async fn has_tool(&self, name: &str) -> bool {
        let tools = self.tools.lock().await;
        tools.contains_key(name)
    }

    /// `{name, description, schema}` descriptors for prompt building.
    pub async fn tools_for_prompt(&self) -> Vec<Value> {
        let tools = self.tools.lock().await;
        let mut descriptors: Vec<Value> = tools
            .values()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "schema": tool.schema(),
                })
            })
            .collect();
        descriptors.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        descriptors
    }

    /// Execute a named tool and return its result dictionary.
    pub async fn execute(&self, name: &str, parameters: Value, agent_id: &str) -> Value {
        let tool = {
            let tools = self.tools.lock().await;
            tools.get(name).cloned()
        };
        let tool = match tool {
            Some(tool) => tool,
            None => {
                return tool_error(codes::TOOL_NOT_FOUND, format!("Tool {} not found", name));
            }
        };
        log::debug!(target: "aos::toolbox", "Tool {} executed by {}", name, agent_id);
        tool.execute(parameters, agent_id, self.orchestrator.upgrade())
            .await
    }
}
