//! External tool server client (MCP JSON-RPC over HTTP)
//!
//! Tools are enumerated once at startup via `tools/list` and invoked at
//! runtime via `tools/call`. The tool server is a required collaborator:
//! when enumeration keeps failing after retries, startup aborts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::Tool;
use crate::config::McpSettings;
use crate::error::{DispatchError, DispatchResult};

const LIST_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Tool descriptor advertised by the tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    tools: Vec<McpToolDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CallToolResult {
    content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// Client for one external tool server
pub struct McpToolClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    request_id: AtomicU64,
}

impl McpToolClient {
    pub fn new(settings: &McpSettings) -> DispatchResult<Self> {
        let url = settings
            .server_url
            .clone()
            .ok_or_else(|| DispatchError::Configuration("mcp.server_url not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| DispatchError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key: settings.api_key.clone(),
            request_id: AtomicU64::new(0),
        })
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> DispatchResult<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed) + 1,
            method: method.to_string(),
            params,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DispatchError::ToolExecution(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DispatchError::ToolExecution(format!(
                "tool server returned {}: {}",
                status, text
            )));
        }

        let parsed: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::ToolExecution(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(DispatchError::ToolExecution(format!(
                "tool server error [{}] {}",
                error.code, error.message
            )));
        }

        parsed
            .result
            .ok_or_else(|| DispatchError::ToolExecution("no result in tool server response".into()))
    }

    /// Enumerate the tools the server advertises
    pub async fn list_tools(&self) -> DispatchResult<Vec<McpToolDescriptor>> {
        let result = self.send_request("tools/list", None).await?;
        let list: ListToolsResult =
            serde_json::from_value(result).map_err(|e| DispatchError::ToolExecution(e.to_string()))?;
        Ok(list.tools)
    }

    /// Invoke a tool by its server-side name
    pub async fn call_tool(&self, name: &str, arguments: Value) -> DispatchResult<String> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.send_request("tools/call", Some(params)).await?;
        let call: CallToolResult =
            serde_json::from_value(result).map_err(|e| DispatchError::ToolExecution(e.to_string()))?;

        let mut output = String::new();
        for item in call.content {
            if item.content_type == "text" {
                if let Some(text) = item.text {
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    output.push_str(&text);
                }
            }
        }
        Ok(output)
    }
}

/// A tool that proxies to the external tool server
pub struct RemoteTool {
    descriptor: McpToolDescriptor,
    client: Arc<McpToolClient>,
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        self.descriptor.description.as_deref().unwrap_or("External tool")
    }

    fn parameters(&self) -> Value {
        self.descriptor
            .input_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object"}))
    }

    async fn call(&self, args: Value) -> DispatchResult<String> {
        self.client.call_tool(&self.descriptor.name, args).await
    }
}

/// Fetch the external tool list with retries; abort startup on persistent
/// failure. Returns one [`RemoteTool`] per advertised descriptor.
pub async fn fetch_external_tools(client: Arc<McpToolClient>) -> DispatchResult<Vec<Arc<dyn Tool>>> {
    let mut last_error = None;

    for attempt in 1..=LIST_RETRIES {
        match client.list_tools().await {
            Ok(descriptors) => {
                info!(count = descriptors.len(), "loaded external tools");
                for d in &descriptors {
                    debug!(tool = %d.name, "external tool");
                }
                return Ok(descriptors
                    .into_iter()
                    .map(|descriptor| {
                        Arc::new(RemoteTool {
                            descriptor,
                            client: client.clone(),
                        }) as Arc<dyn Tool>
                    })
                    .collect());
            }
            Err(e) => {
                warn!(attempt, error = %e, "tool server enumeration failed");
                last_error = Some(e);
                if attempt < LIST_RETRIES {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    Err(DispatchError::Configuration(format!(
        "external tool server is required but unreachable after {} attempts: {}",
        LIST_RETRIES,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}
