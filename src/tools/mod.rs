//! Tool abstraction and per-agent tool sets
//!
//! A [`ToolSet`] is built once per agent at startup: built-in tools first,
//! then tools discovered from the external tool server. Names are unique;
//! on conflict the built-in wins and the external duplicate is dropped.

pub mod billing;
pub mod mcp;
pub mod support;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::ToolDefinition;
use crate::error::{DispatchError, DispatchResult};

/// A named function the LLM may invoke with JSON arguments
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Description shown to the LLM
    fn description(&self) -> &str;

    /// JSON Schema for the arguments
    fn parameters(&self) -> Value;

    /// Execute the tool
    async fn call(&self, args: Value) -> DispatchResult<String>;
}

/// Immutable, name-unique collection of tools for one agent
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
    /// Per-call execution timeout
    timeout: Duration,
}

impl ToolSet {
    /// Merge built-in tools with externally discovered ones. External tools
    /// whose name collides with a built-in are dropped with a warning.
    pub fn new(built_in: Vec<Arc<dyn Tool>>, external: Vec<Arc<dyn Tool>>) -> Self {
        let mut tools = built_in;
        let mut names: HashSet<String> = tools.iter().map(|t| t.name().to_string()).collect();

        for tool in external {
            if names.contains(tool.name()) {
                tracing::warn!(tool = tool.name(), "dropping external tool shadowed by built-in");
                continue;
            }
            names.insert(tool.name().to_string());
            tools.push(tool);
        }

        Self {
            tools,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Definitions to bind to the LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Execute a tool by name. Failures (unknown tool, tool error, timeout)
    /// are folded into the returned message text so the LLM can react; a
    /// tool call never fails the turn.
    pub async fn execute(&self, name: &str, args: Value) -> String {
        let Some(tool) = self.get(name) else {
            return format!("Unknown tool: {}", name);
        };

        match tokio::time::timeout(self.timeout, tool.call(args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(tool = name, error = %e, "tool execution failed");
                format!("Tool error: {}", e)
            }
            Err(_) => {
                tracing::warn!(tool = name, "tool execution timed out");
                format!("Tool error: {} timed out", name)
            }
        }
    }
}

/// A tool implemented by a plain function (built-ins)
pub struct FnTool {
    name: &'static str,
    description: &'static str,
    parameters: Value,
    handler: Box<dyn Fn(Value) -> DispatchResult<String> + Send + Sync>,
}

impl FnTool {
    pub fn new(
        name: &'static str,
        description: &'static str,
        parameters: Value,
        handler: impl Fn(Value) -> DispatchResult<String> + Send + Sync + 'static,
    ) -> Arc<dyn Tool> {
        Arc::new(Self {
            name,
            description,
            parameters,
            handler: Box::new(handler),
        })
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn call(&self, args: Value) -> DispatchResult<String> {
        (self.handler)(args)
    }
}

/// Extract a required string argument
pub(crate) fn required_str(args: &Value, key: &str) -> DispatchResult<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| DispatchError::ToolExecution(format!("missing argument: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &'static str) -> Arc<dyn Tool> {
        FnTool::new(name, "echo", json!({"type": "object"}), |args| {
            Ok(format!("echo:{}", args))
        })
    }

    #[test]
    fn built_in_wins_name_conflicts() {
        let set = ToolSet::new(
            vec![echo_tool("a"), echo_tool("b")],
            vec![echo_tool("b"), echo_tool("c")],
        );
        assert_eq!(set.len(), 3);
        let names: Vec<_> = set.definitions().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unknown_tool_returns_message_not_error() {
        let set = ToolSet::new(vec![], vec![]);
        let out = set.execute("nope", json!({})).await;
        assert_eq!(out, "Unknown tool: nope");
    }

    #[tokio::test]
    async fn tool_error_is_folded_into_message() {
        let failing = FnTool::new("boom", "fails", json!({"type": "object"}), |_| {
            Err(DispatchError::ToolExecution("kaput".into()))
        });
        let set = ToolSet::new(vec![failing], vec![]);
        let out = set.execute("boom", json!({})).await;
        assert!(out.starts_with("Tool error:"));
        assert!(out.contains("kaput"));
    }
}
