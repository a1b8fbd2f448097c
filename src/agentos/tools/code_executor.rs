//! Python snippet executor.
//!
//! Runs agent-provided source in a `python3` subprocess under a 30 s
//! wall-clock limit.  Each stream is capped at 100 KB; anything beyond
//! the cap is cut and marked with a truncation sentinel.  The sandbox is
//! defense-in-depth, not a jail: the subprocess inherits the host
//! environment.

use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::{codes, tool_error, Tool};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

const EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_BYTES: usize = 100 * 1024;
const TRUNCATION_SENTINEL: &str = "... [output truncated]";

/// Cut a stream at [`MAX_OUTPUT_BYTES`], appending the sentinel when
/// anything was dropped.
fn cap_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_OUTPUT_BYTES {
        return text.into_owned();
    }
    let mut cut = MAX_OUTPUT_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n{}", &text[..cut], TRUNCATION_SENTINEL)
}

/// Executes Python code snippets in an isolated subprocess.
pub struct CodeExecutorTool;

impl CodeExecutorTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CodeExecutorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CodeExecutorTool {
    fn name(&self) -> &str {
        "code_executor"
    }

    fn description(&self) -> &str {
        "Execute Python code snippets safely"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The code to execute",
                },
                "language": {
                    "type": "string",
                    "description": "Programming language",
                    "enum": ["python"],
                    "default": "python",
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(
        &self,
        parameters: Value,
        agent_id: &str,
        _orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value {
        let code = match parameters["code"].as_str() {
            Some(code) if !code.is_empty() => code,
            _ => return tool_error(codes::INVALID_PARAMETERS, "No code provided"),
        };
        let language = parameters["language"].as_str().unwrap_or("python");
        if language != "python" {
            return tool_error(
                codes::INVALID_PARAMETERS,
                format!("Language {} not supported", language),
            );
        }

        let source_path =
            std::env::temp_dir().join(format!("aos_exec_{}.py", Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&source_path, code).await {
            return tool_error(codes::EXECUTION_FAILED, e.to_string());
        }

        log::debug!(
            target: "aos::tools::code_executor",
            "Agent {} executing {} bytes of python",
            agent_id,
            code.len()
        );

        let child = Command::new("python3")
            .arg(&source_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_file(&source_path).await;
                return tool_error(
                    codes::EXECUTION_FAILED,
                    format!("Code execution failed: {}", e),
                );
            }
        };

        let outcome = tokio::time::timeout(EXECUTION_TIMEOUT, child.wait_with_output()).await;
        let _ = tokio::fs::remove_file(&source_path).await;

        match outcome {
            Ok(Ok(output)) => {
                let return_code = output.status.code().unwrap_or(-1);
                json!({
                    "success": output.status.success(),
                    "stdout": cap_output(&output.stdout),
                    "stderr": cap_output(&output.stderr),
                    "return_code": return_code,
                })
            }
            Ok(Err(e)) => tool_error(
                codes::EXECUTION_FAILED,
                format!("Code execution failed: {}", e),
            ),
            // Dropping the future kills the child (kill_on_drop).
            Err(_) => tool_error(codes::TIMEOUT, "Code execution timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let tool = CodeExecutorTool::new();
        let result = tool.execute(json!({"code": ""}), "a1", None).await;
        assert_eq!(result["code"], codes::INVALID_PARAMETERS);
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected() {
        let tool = CodeExecutorTool::new();
        let result = tool
            .execute(json!({"code": "1", "language": "cobol"}), "a1", None)
            .await;
        assert_eq!(result["code"], codes::INVALID_PARAMETERS);
    }

    #[test]
    fn long_output_is_truncated_with_sentinel() {
        let big = vec![b'x'; MAX_OUTPUT_BYTES + 100];
        let capped = cap_output(&big);
        assert!(capped.ends_with(TRUNCATION_SENTINEL));
        assert!(capped.len() < big.len() + TRUNCATION_SENTINEL.len() + 2);
    }

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(cap_output(b"hello"), "hello");
    }
}
