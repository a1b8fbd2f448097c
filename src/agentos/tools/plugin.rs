//! Generated plugin tools.
//!
//! Tools forged at runtime live in the plugins directory as a Python
//! entrypoint plus a JSON manifest:
//!
//! ```json
//! {
//!   "name": "string_hasher",
//!   "description": "Hashes a string with SHA-256.",
//!   "entrypoint": "generated_string_hasher_ab12cd34.py",
//!   "schema": {"type": "object", "properties": {"text": {"type": "string"}}}
//! }
//! ```
//!
//! The toolbox reads every `*.json` manifest at init/refresh and wraps
//! each in a [`PluginTool`] that invokes the entrypoint as a subprocess,
//! passing the parameters as a JSON argv argument and parsing stdout as
//! the result dictionary.

use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::{codes, tool_error, Tool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

const PLUGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Static description of a generated tool, read from the plugins dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub description: String,
    /// Python file implementing the tool, relative to the plugins dir.
    pub entrypoint: String,
    #[serde(default)]
    pub schema: Option<Value>,
}

impl PluginManifest {
    /// Load a manifest from a `*.json` file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    }
}

/// A runtime-discovered tool backed by a Python entrypoint.
pub struct PluginTool {
    manifest: PluginManifest,
    entrypoint: PathBuf,
}

impl PluginTool {
    pub fn new(manifest: PluginManifest, plugins_dir: &Path) -> Self {
        let entrypoint = plugins_dir.join(&manifest.entrypoint);
        Self {
            manifest,
            entrypoint,
        }
    }
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn schema(&self) -> Value {
        self.manifest
            .schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object"}))
    }

    async fn execute(
        &self,
        parameters: Value,
        agent_id: &str,
        _orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value {
        if !self.entrypoint.exists() {
            return tool_error(
                codes::EXECUTION_FAILED,
                format!("Plugin entrypoint missing: {}", self.entrypoint.display()),
            );
        }
        log::debug!(
            target: "aos::tools::plugin",
            "Agent {} invoking generated tool '{}'",
            agent_id,
            self.manifest.name
        );

        let child = Command::new("python3")
            .arg(&self.entrypoint)
            .arg(parameters.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return tool_error(codes::EXECUTION_FAILED, e.to_string()),
        };

        match tokio::time::timeout(PLUGIN_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !output.status.success() {
                    return json!({
                        "error": format!("Plugin '{}' exited non-zero", self.manifest.name),
                        "code": codes::EXECUTION_FAILED,
                        "details": String::from_utf8_lossy(&output.stderr),
                    });
                }
                // Plugins print a JSON result object; anything else is
                // surfaced verbatim.
                serde_json::from_str::<Value>(stdout.trim())
                    .unwrap_or_else(|_| json!({"status": "success", "stdout": stdout}))
            }
            Ok(Err(e)) => tool_error(codes::EXECUTION_FAILED, e.to_string()),
            Err(_) => tool_error(codes::TIMEOUT, "Plugin execution timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn manifest_round_trips_through_json() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join("tool.json");
        let manifest = PluginManifest {
            name: "string_hasher".to_string(),
            description: "Hashes strings".to_string(),
            entrypoint: "generated_string_hasher_ab12cd34.py".to_string(),
            schema: None,
        };
        std::fs::write(
            &manifest_path,
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();

        let loaded = PluginManifest::load(&manifest_path).unwrap();
        assert_eq!(loaded.name, "string_hasher");
        assert_eq!(loaded.entrypoint, "generated_string_hasher_ab12cd34.py");
    }

    #[tokio::test]
    async fn missing_entrypoint_is_an_execution_failure() {
        let dir = TempDir::new().unwrap();
        let tool = PluginTool::new(
            PluginManifest {
                name: "ghost".to_string(),
                description: "missing".to_string(),
                entrypoint: "ghost.py".to_string(),
                schema: None,
            },
            dir.path(),
        );
        let result = tool.execute(json!({}), "a1", None).await;
        assert_eq!(result["code"], codes::EXECUTION_FAILED);
    }
}
