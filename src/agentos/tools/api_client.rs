//! HTTP client tool.
//!
//! Lets agents call external APIs with GET or POST.  Before any request
//! is sent the target host is resolved and checked: private-range and
//! loopback addresses are refused, so an agent cannot be talked into
//! probing the machine it runs on or the local network.

use crate::agentos::llm::openai_compatible::get_shared_http_client;
use crate::agentos::orchestrator::Orchestrator;
use crate::agentos::tools::{codes, tool_error, Tool};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::net::IpAddr;
use std::sync::Arc;

/// Is this address off-limits for agent traffic?
fn is_forbidden(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Resolve the URL's host and refuse private or loopback targets.
async fn validate_url(url: &str) -> Result<reqwest::Url, Value> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| tool_error(codes::INVALID_PARAMETERS, "Invalid or unresolvable URL."))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| tool_error(codes::INVALID_PARAMETERS, "Invalid or unresolvable URL."))?
        .to_string();
    let port = parsed.port_or_known_default().unwrap_or(80);

    // IP literals short-circuit; everything else goes through DNS.
    let addrs: Vec<IpAddr> = if let Ok(ip) = host.parse::<IpAddr>() {
        vec![ip]
    } else {
        match tokio::net::lookup_host((host.as_str(), port)).await {
            Ok(resolved) => resolved.map(|sock| sock.ip()).collect(),
            Err(_) => {
                return Err(tool_error(
                    codes::INVALID_PARAMETERS,
                    "Invalid or unresolvable URL.",
                ))
            }
        }
    };
    if addrs.is_empty() {
        return Err(tool_error(
            codes::INVALID_PARAMETERS,
            "Invalid or unresolvable URL.",
        ));
    }
    if let Some(forbidden) = addrs.into_iter().find(|addr| is_forbidden(*addr)) {
        return Err(tool_error(
            codes::SECURITY_VALIDATION_FAILED,
            format!(
                "Access to private or loopback address {} is forbidden.",
                forbidden
            ),
        ));
    }
    Ok(parsed)
}

/// Makes HTTP requests to external APIs on behalf of an agent.
pub struct ApiClientTool;

impl ApiClientTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ApiClientTool {
    fn default() -> Self {
        Self::new()
    }
}

fn as_string_map(value: &Value) -> Vec<(String, String)> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .map(|(key, val)| {
                    let text = match val {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for ApiClientTool {
    fn name(&self) -> &str {
        "api_client"
    }

    fn description(&self) -> &str {
        "Makes HTTP requests (GET, POST) to external APIs to fetch or send data."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "description": "The HTTP method to use.",
                    "enum": ["GET", "POST"],
                },
                "url": {
                    "type": "string",
                    "description": "The URL of the API endpoint.",
                },
                "params": {
                    "type": "object",
                    "description": "Optional dictionary of URL query parameters for GET requests.",
                },
                "headers": {
                    "type": "object",
                    "description": "Optional dictionary of HTTP headers.",
                },
                "json_body": {
                    "type": "object",
                    "description": "Optional JSON payload for POST requests.",
                }
            },
            "required": ["method", "url"]
        })
    }

    async fn execute(
        &self,
        parameters: Value,
        agent_id: &str,
        _orchestrator: Option<Arc<Orchestrator>>,
    ) -> Value {
        let method = parameters["method"]
            .as_str()
            .unwrap_or("")
            .to_ascii_uppercase();
        let url = match parameters["url"].as_str() {
            Some(url) => url,
            None => {
                return tool_error(
                    codes::INVALID_PARAMETERS,
                    "Invalid parameters. 'method' (GET/POST) and 'url' are required.",
                )
            }
        };
        if method != "GET" && method != "POST" {
            return tool_error(
                codes::INVALID_PARAMETERS,
                "Invalid parameters. 'method' (GET/POST) and 'url' are required.",
            );
        }

        let target = match validate_url(url).await {
            Ok(target) => target,
            Err(error) => {
                log::error!(
                    target: "aos::tools::api_client",
                    "Agent {} URL validation failed for {}",
                    agent_id,
                    url
                );
                return error;
            }
        };

        log::info!(
            target: "aos::tools::api_client",
            "Agent {} executing {} request to {}",
            agent_id,
            method,
            url
        );

        let client = get_shared_http_client();
        let mut request = if method == "GET" {
            client.get(target)
        } else {
            client.post(target)
        };
        for (key, value) in as_string_map(&parameters["params"]) {
            request = request.query(&[(key, value)]);
        }
        for (key, value) in as_string_map(&parameters["headers"]) {
            request = request.header(key, value);
        }
        if method == "POST" {
            let body = parameters
                .get("json_body")
                .cloned()
                .unwrap_or(Value::Object(Map::new()));
            request = request.json(&body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return json!({
                    "error": "HTTP request failed",
                    "code": codes::EXECUTION_FAILED,
                    "details": e.to_string(),
                })
            }
        };

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return json!({
                    "error": "HTTP request failed",
                    "code": codes::EXECUTION_FAILED,
                    "details": e.to_string(),
                })
            }
        };
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        json!({
            "status": "success",
            "status_code": status_code,
            "content_type": content_type,
            "body": body,
        })
    }
}
