//! Inter-agent messaging tool.
//!
//! Thin wrapper over the orchestrator's mailbox routing: validates the
//! parameters and forwards `{recipient_id, content}` as a mailbox send.

use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::{codes, tool_error, Tool};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct MessagingTool;

impl MessagingTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MessagingTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for MessagingTool {
    fn name(&self) -> &str {
        "messaging"
    }

    fn description(&self) -> &str {
        "Sends a message to another agent in the system."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "recipient_id": {
                    "type": "string",
                    "description": "The ID of the agent to send the message to.",
                },
                "content": {
                    "type": "object",
                    "description": "A JSON object containing the message content.",
                }
            },
            "required": ["recipient_id", "content"]
        })
    }

    async fn execute(
        &self,
        parameters: Value,
        agent_id: &str,
        orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value {
        let orchestrator = match orchestrator {
            Some(orchestrator) => orchestrator,
            None => return tool_error(codes::EXECUTION_FAILED, "Messaging is not available."),
        };
        let recipient_id = match parameters["recipient_id"].as_str() {
            Some(recipient_id) => recipient_id,
            None => return tool_error(codes::INVALID_PARAMETERS, "'recipient_id' is required."),
        };
        let content = match parameters.get("content") {
            Some(content) if content.is_object() => content.clone(),
            _ => {
                return tool_error(
                    codes::INVALID_PARAMETERS,
                    "'content' must be a JSON object.",
                )
            }
        };

        if orchestrator
            .send_message(agent_id, recipient_id, content)
            .await
        {
            json!({
                "status": "success",
                "message": format!("Message sent to {}.", recipient_id),
            })
        } else {
            tool_error(
                codes::EXECUTION_FAILED,
                format!("Failed to send message to {}.", recipient_id),
            )
        }
    }
}
