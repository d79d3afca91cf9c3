//! OpenAI-compatible chat completions backend

use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatBackend, ChatRequest, ChatResponse};
use crate::config::LlmSettings;
use crate::domain::{Message, Role, ToolCall};
use crate::error::{LlmError, LlmResult};

/// OpenAI-compatible chat backend
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl OpenAiBackend {
    /// Create a backend from configuration. The API key is read from the
    /// environment variable named in `settings.api_key_env`.
    pub fn new(settings: &LlmSettings) -> LlmResult<Self> {
        let api_key = env::var(&settings.api_key_env).map_err(|_| {
            LlmError::Authentication(format!(
                "Environment variable {} not set",
                settings.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
        })
    }

    /// Build the request body for the chat completions API
    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_ref().unwrap_or(&self.model),
            "messages": convert_messages(&request.messages),
            "temperature": request.temperature.unwrap_or(self.temperature),
            "top_p": request.top_p.unwrap_or(self.top_p),
        });

        if !request.tools.is_empty() {
            body["tools"] = json!(request
                .tools
                .iter()
                .map(|t| {
                    // OpenAI requires at minimum {"type": "object"} for parameters
                    let params = if t.parameters.is_null()
                        || t.parameters.as_object().map_or(true, |o| o.is_empty())
                    {
                        json!({"type": "object", "properties": {}, "required": []})
                    } else {
                        t.parameters.clone()
                    };
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": params
                        }
                    })
                })
                .collect::<Vec<_>>());
        }

        body
    }

    async fn send(&self, body: &Value) -> LlmResult<ChatResponse> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        parse_response(parsed)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let body = self.build_request_body(&request);

        // One retry on timeout only
        match self.send(&body).await {
            Err(LlmError::Timeout) => {
                tracing::warn!(model = %self.model, "LLM call timed out, retrying once");
                self.send(&body).await
            }
            other => other,
        }
    }
}

/// Convert internal messages to the chat completions wire format
fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                },
                "content": m.content,
            });

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": serde_json::to_string(&tc.arguments)
                                    .unwrap_or_default()
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }

            if let Some(tool_call_id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(tool_call_id);
            }

            if let Some(name) = &m.name {
                msg["name"] = json!(name);
            }

            msg
        })
        .collect()
}

fn parse_response(response: OpenAiResponse) -> LlmResult<ChatResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: serde_json::from_str(&tc.function.arguments)
                .unwrap_or(Value::Object(Default::default())),
        })
        .collect();

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolDefinition;

    #[test]
    fn converts_tool_messages() {
        let messages = vec![
            Message::system("sys"),
            Message::assistant_with_tools(
                "",
                vec![ToolCall::new("c1", "look_up_invoice", json!({"invoice_id": "INV-1"}))],
            ),
            Message::tool_result("c1", "look_up_invoice", "paid"),
        ];

        let wire = convert_messages(&messages);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["tool_calls"][0]["function"]["name"], "look_up_invoice");
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "c1");
    }

    #[test]
    fn parses_tool_call_response() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "get_refund_status", "arguments": "{\"refund_id\":\"R-1\"}"}
                    }]
                }
            }]
        });
        let parsed: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let response = parse_response(parsed).unwrap();
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls[0].name, "get_refund_status");
        assert_eq!(response.tool_calls[0].arguments["refund_id"], "R-1");
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "t", "arguments": "not json"}
                    }]
                }
            }]
        });
        let parsed: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let response = parse_response(parsed).unwrap();
        assert!(response.tool_calls[0].arguments.is_object());
    }

    #[test]
    fn empty_tool_schema_gets_object_type() {
        let settings = LlmSettings::default();
        std::env::set_var("OPENAI_API_KEY_TEST_SCHEMA", "k");
        let settings = LlmSettings {
            api_key_env: "OPENAI_API_KEY_TEST_SCHEMA".to_string(),
            ..settings
        };
        let backend = OpenAiBackend::new(&settings).unwrap();
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition::new("t", "d", Value::Null)],
            ..Default::default()
        };
        let body = backend.build_request_body(&request);
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
    }
}
