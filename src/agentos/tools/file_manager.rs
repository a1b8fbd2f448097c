//! Sandboxed file manager.
//!
//! Each agent gets a file manager rooted at its own workspace directory.
//! Operations: `write`, `read`, `list`, `copy_to_delivery`.  Every path
//! is canonicalised inside the workspace root; attempts to escape it
//! (absolute paths, `..` traversal, symlinks pointing outside) are
//! rejected with `PERMISSION_DENIED`.
//!
//! `copy_to_delivery` is the hand-off point of the whole system: it
//! copies a finished artefact from the private workspace into the shared
//! flat delivery directory where results are assembled.

use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::{codes, tool_error, Tool};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const OP_WRITE: &str = "write";
const OP_READ: &str = "read";
const OP_LIST: &str = "list";
const OP_COPY_TO_DELIVERY: &str = "copy_to_delivery";
const SUPPORTED_OPERATIONS: &[&str] = &[OP_WRITE, OP_READ, OP_LIST, OP_COPY_TO_DELIVERY];

/// Resolve `path` inside `workspace`, refusing escapes.
///
/// The check is lexical first (absolute paths and net-upward `..` are
/// rejected before touching the filesystem), then physical: if the
/// resolved path exists it is canonicalised and must still sit under the
/// canonical workspace, which catches symlinks pointing outside.
pub fn resolve_in_workspace(workspace: &Path, path: &str) -> Result<PathBuf, String> {
    let requested = Path::new(path);
    if requested.is_absolute() {
        return Err("Access denied: Absolute paths are not allowed.".to_string());
    }

    let mut normalized = PathBuf::new();
    let mut depth: i32 = 0;
    for component in requested.components() {
        match component {
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(
                        "Access denied: Attempt to access files outside of the workspace."
                            .to_string(),
                    );
                }
                normalized.pop();
            }
            Component::CurDir => {}
            _ => {
                return Err("Access denied: Unsupported path component.".to_string());
            }
        }
    }

    let resolved = workspace.join(&normalized);
    if resolved.exists() {
        let canonical_workspace = workspace
            .canonicalize()
            .map_err(|e| format!("Cannot resolve workspace root: {}", e))?;
        let canonical = resolved
            .canonicalize()
            .map_err(|e| format!("Cannot resolve path: {}", e))?;
        if !canonical.starts_with(&canonical_workspace) {
            return Err(
                "Access denied: Attempt to access files outside of the workspace.".to_string(),
            );
        }
    }
    Ok(resolved)
}

/// File operations confined to one agent's workspace.
pub struct FileManagerTool {
    workspace_dir: PathBuf,
    delivery_dir: Option<PathBuf>,
}

impl FileManagerTool {
    pub fn new(workspace_dir: PathBuf, delivery_dir: Option<PathBuf>) -> Self {
        Self {
            workspace_dir,
            delivery_dir,
        }
    }

    fn safe_path(&self, path: &str) -> Result<PathBuf, Value> {
        resolve_in_workspace(&self.workspace_dir, path)
            .map_err(|message| tool_error(codes::PERMISSION_DENIED, message))
    }

    async fn write_file(&self, parameters: &Value, agent_id: &str) -> Value {
        let path = match parameters["path"].as_str() {
            Some(path) => path,
            None => {
                return tool_error(
                    codes::INVALID_PARAMETERS,
                    "'path' and 'content' are required for 'write'.",
                )
            }
        };
        let content = match parameters["content"].as_str() {
            Some(content) => content,
            None => {
                return tool_error(
                    codes::INVALID_PARAMETERS,
                    "'path' and 'content' are required for 'write'.",
                )
            }
        };
        let safe_path = match self.safe_path(path) {
            Ok(safe_path) => safe_path,
            Err(error) => return error,
        };
        if let Some(parent) = safe_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return tool_error(codes::EXECUTION_FAILED, e.to_string());
            }
        }
        if let Err(e) = tokio::fs::write(&safe_path, content).await {
            return tool_error(codes::EXECUTION_FAILED, e.to_string());
        }
        let message = format!("File '{}' written successfully.", path);
        log::info!(target: "aos::tools::file_manager", "Agent {}: {}", agent_id, message);
        json!({"status": "success", "message": message})
    }

    async fn read_file(&self, parameters: &Value) -> Value {
        let path = match parameters["path"].as_str() {
            Some(path) => path,
            None => return tool_error(codes::INVALID_PARAMETERS, "'path' is required for 'read'."),
        };
        let safe_path = match self.safe_path(path) {
            Ok(safe_path) => safe_path,
            Err(error) => return error,
        };
        if !safe_path.exists() {
            return tool_error(codes::FILE_NOT_FOUND, format!("File not found: {}", path));
        }
        if safe_path.is_dir() {
            return tool_error(
                codes::IS_A_DIRECTORY,
                format!("Path is a directory, not a file: {}", path),
            );
        }
        match tokio::fs::read_to_string(&safe_path).await {
            Ok(content) => json!({"status": "success", "path": path, "content": content}),
            Err(e) => tool_error(codes::EXECUTION_FAILED, e.to_string()),
        }
    }

    async fn list_directory(&self, parameters: &Value) -> Value {
        let path = parameters["path"].as_str().unwrap_or(".");
        let safe_path = match self.safe_path(path) {
            Ok(safe_path) => safe_path,
            Err(error) => return error,
        };
        if !safe_path.is_dir() {
            return tool_error(
                codes::DIRECTORY_NOT_FOUND,
                format!("Directory not found: {}", path),
            );
        }
        let mut items = Vec::new();
        let mut entries = match tokio::fs::read_dir(&safe_path).await {
            Ok(entries) => entries,
            Err(e) => return tool_error(codes::EXECUTION_FAILED, e.to_string()),
        };
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => items.push(entry.file_name().to_string_lossy().to_string()),
                Ok(None) => break,
                Err(e) => return tool_error(codes::EXECUTION_FAILED, e.to_string()),
            }
        }
        items.sort();
        json!({"status": "success", "path": path, "items": items})
    }

    async fn copy_to_delivery(&self, parameters: &Value, agent_id: &str) -> Value {
        let delivery_dir = match &self.delivery_dir {
            Some(delivery_dir) => delivery_dir,
            None => {
                return tool_error(
                    codes::DELIVERY_NOT_CONFIGURED,
                    "Delivery folder not configured",
                )
            }
        };
        let path = match parameters["path"].as_str() {
            Some(path) => path,
            None => {
                return tool_error(
                    codes::INVALID_PARAMETERS,
                    "'path' is required for 'copy_to_delivery'.",
                )
            }
        };
        let source_path = match self.safe_path(path) {
            Ok(source_path) => source_path,
            Err(error) => return error,
        };
        if !source_path.exists() {
            return tool_error(codes::FILE_NOT_FOUND, format!("File not found: {}", path));
        }
        let default_name = source_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        let delivery_name = parameters["delivery_name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or(default_name);
        // Delivery names are flat: keep only the final component so a
        // crafted name cannot climb out of the delivery directory.
        let flattened = Path::new(&delivery_name)
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        let delivery_name = flattened.unwrap_or(delivery_name);
        let delivery_path = delivery_dir.join(&delivery_name);
        if let Err(e) = tokio::fs::create_dir_all(delivery_dir).await {
            return tool_error(codes::EXECUTION_FAILED, e.to_string());
        }
        if let Err(e) = tokio::fs::copy(&source_path, &delivery_path).await {
            return tool_error(codes::EXECUTION_FAILED, e.to_string());
        }
        let message = format!("File '{}' copied to delivery as '{}'.", path, delivery_name);
        log::info!(target: "aos::tools::file_manager", "Agent {}: {}", agent_id, message);
        json!({
            "status": "success",
            "message": message,
            "delivery_path": delivery_path.to_string_lossy(),
        })
    }
}

#[async_trait]
impl Tool for FileManagerTool {
    fn name(&self) -> &str {
        "file_manager"
    }

    fn description(&self) -> &str {
        "Manages files in a sandboxed workspace. Operations: write, read, list, copy_to_delivery."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "description": "The file operation to perform.",
                    "enum": SUPPORTED_OPERATIONS,
                },
                "path": {
                    "type": "string",
                    "description": "Relative path for the file or directory within the workspace.",
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file. Required for 'write'.",
                },
                "delivery_name": {
                    "type": "string",
                    "description": "Optional name for the file in the delivery folder. Used with 'copy_to_delivery'.",
                }
            },
            "required": ["operation", "path"]
        })
    }

    async fn execute(
        &self,
        parameters: Value,
        agent_id: &str,
        _orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value {
        let operation = match parameters["operation"].as_str() {
            Some(operation) => operation,
            None => {
                return tool_error(codes::INVALID_PARAMETERS, "'operation' parameter is required.")
            }
        };
        match operation {
            OP_WRITE => self.write_file(&parameters, agent_id).await,
            OP_READ => self.read_file(&parameters).await,
            OP_LIST => self.list_directory(&parameters).await,
            OP_COPY_TO_DELIVERY => self.copy_to_delivery(&parameters, agent_id).await,
            other => tool_error(
                codes::INVALID_PARAMETERS,
                format!(
                    "Unsupported operation: {}. Supported operations: {}",
                    other,
                    SUPPORTED_OPERATIONS.join(", ")
                ),
            ),
        }
    }
}
