//! LLM backend abstraction
//!
//! All backends implement [`ChatBackend`]: one chat completion call with
//! optional tool definitions bound to it. The production backend speaks the
//! OpenAI-compatible chat completions API; [`ScriptedBackend`] serves tests.

mod mock;
mod openai;

pub use mock::{ScriptItem, ScriptedBackend};
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmSettings;
use crate::domain::{Message, ToolCall, ToolDefinition};
use crate::error::LlmResult;

/// Request for a chat completion
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,
    /// Model override (backend default when `None`)
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,
}

/// Response from a chat completion
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Text content of the reply (may be empty when tools are called)
    pub content: String,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    /// Whether the model requested any tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Trait for chat completion backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Run one chat completion
    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse>;
}

/// Create the configured chat backend
pub fn create_backend(settings: &LlmSettings) -> LlmResult<Arc<dyn ChatBackend>> {
    Ok(Arc::new(OpenAiBackend::new(settings)?))
}
