//! Pytest runner.
//!
//! Runs `python3 -m pytest` on a nominated test file inside the agent's
//! workspace, with a 60 s timeout.  This is the proving ground of the
//! tool-forging protocol: a forger must show green tests before it may
//! report success.

use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::file_manager::resolve_in_workspace;
use crate::agentos::tools::{codes, tool_error, Tool};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

const PYTEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs pytest on a test file within a fixed workspace directory.
pub struct PytestRunnerTool {
    workspace_dir: PathBuf,
}

impl PytestRunnerTool {
    pub fn new(workspace_dir: PathBuf) -> Self {
        Self { workspace_dir }
    }
}

#[async_trait]
impl Tool for PytestRunnerTool {
    fn name(&self) -> &str {
        "pytest_runner"
    }

    fn description(&self) -> &str {
        "Runs pytest on a specified test file and returns the output."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "test_file_path": {
                    "type": "string",
                    "description": "The relative path to the test file to be executed.",
                }
            },
            "required": ["test_file_path"]
        })
    }

    async fn execute(
        &self,
        parameters: Value,
        agent_id: &str,
        _orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value {
        let test_file_path = match parameters["test_file_path"].as_str() {
            Some(path) => path,
            None => {
                return tool_error(
                    codes::INVALID_PARAMETERS,
                    "'test_file_path' parameter is required.",
                )
            }
        };
        let safe_path = match resolve_in_workspace(&self.workspace_dir, test_file_path) {
            Ok(safe_path) => safe_path,
            Err(message) => return tool_error(codes::PERMISSION_DENIED, message),
        };
        if !safe_path.exists() {
            return tool_error(
                codes::FILE_NOT_FOUND,
                format!("Test file not found at '{}'.", test_file_path),
            );
        }

        log::info!(
            target: "aos::tools::pytest_runner",
            "Agent {} running pytest on {}",
            agent_id,
            test_file_path
        );

        let child = Command::new("python3")
            .arg("-m")
            .arg("pytest")
            .arg(&safe_path)
            .current_dir(&self.workspace_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return tool_error(
                    codes::EXECUTION_FAILED,
                    format!("An unexpected error occurred while running pytest: {}", e),
                )
            }
        };

        match tokio::time::timeout(PYTEST_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let return_code = output.status.code().unwrap_or(-1);
                json!({
                    "status": if output.status.success() { "success" } else { "failed" },
                    "return_code": return_code,
                    "stdout": String::from_utf8_lossy(&output.stdout),
                    "stderr": String::from_utf8_lossy(&output.stderr),
                })
            }
            Ok(Err(e)) => tool_error(
                codes::EXECUTION_FAILED,
                format!("An unexpected error occurred while running pytest: {}", e),
            ),
            Err(_) => tool_error(codes::TIMEOUT, "Pytest execution timed out after 60 seconds."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_parameter_is_rejected() {
        let workspace = TempDir::new().unwrap();
        let tool = PytestRunnerTool::new(workspace.path().to_path_buf());
        let result = tool.execute(json!({}), "a1", None).await;
        assert_eq!(result["code"], codes::INVALID_PARAMETERS);
    }

    #[tokio::test]
    async fn missing_test_file_is_reported() {
        let workspace = TempDir::new().unwrap();
        let tool = PytestRunnerTool::new(workspace.path().to_path_buf());
        let result = tool
            .execute(json!({"test_file_path": "test_nothing.py"}), "a1", None)
            .await;
        assert_eq!(result["code"], codes::FILE_NOT_FOUND);
    }

    #[tokio::test]
    async fn escaping_the_workspace_is_denied() {
        let workspace = TempDir::new().unwrap();
        let tool = PytestRunnerTool::new(workspace.path().to_path_buf());
        let result = tool
            .execute(json!({"test_file_path": "../outside_test.py"}), "a1", None)
            .await;
        assert_eq!(result["code"], codes::PERMISSION_DENIED);
    }
}
