//! ReAct agent: Thought / Action / Action Input / Observation loop

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Agent, AgentPersona, AgentServices};
use crate::config::Settings;
use crate::domain::{AgentOutcome, AgentSlice, Message, Role, ToolCall};
use crate::error::DispatchResult;
use crate::llm::ChatRequest;
use crate::retrieval::{format_last_n, join_context};
use crate::tools::ToolSet;

const RETRIEVE_TOP_K: usize = 3;
const HISTORY_TURNS: usize = 10;

/// One parsed step of the ReAct protocol
#[derive(Debug, PartialEq)]
enum ReActStep {
    /// Terminal answer text
    FinalAnswer(String),
    /// Tool invocation request
    Action { name: String, input: Value },
    /// No recognizable directive; the text is the answer
    Plain(String),
}

/// Agent variant that drives tools through the ReAct text protocol instead
/// of native tool calling.
pub struct ReActAgent {
    persona: AgentPersona,
    services: AgentServices,
    tools: ToolSet,
    model_id: String,
    top_p: f32,
    max_steps: u32,
}

impl ReActAgent {
    pub fn new(
        persona: AgentPersona,
        services: AgentServices,
        tools: ToolSet,
        settings: &Settings,
    ) -> Self {
        Self {
            persona,
            services,
            tools,
            model_id: settings.llm.model.clone(),
            top_p: settings.llm.top_p,
            max_steps: settings.supervisor.react_max_steps,
        }
    }

    fn system_prompt(&self) -> String {
        let tool_lines: Vec<String> = self
            .tools
            .definitions()
            .iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect();
        format!(
            "{}\n\nYou can use the following tools:\n{}\n\n\
             Use this exact format:\n\
             Thought: what you are thinking\n\
             Action: tool name\n\
             Action Input: JSON arguments for the tool\n\
             Observation: (will be provided)\n\
             ... repeat Thought/Action as needed ...\n\
             Final Answer: the answer for the user",
            self.persona.system_prompt,
            tool_lines.join("\n")
        )
    }

    async fn react_loop(&self, mut messages: Vec<Message>) -> DispatchResult<(String, Vec<Message>)> {
        let mut produced: Vec<Message> = Vec::new();
        let mut best_effort = String::new();

        for _ in 0..self.max_steps {
            let response = self
                .services
                .backend
                .chat(ChatRequest {
                    messages: messages.clone(),
                    tools: Vec::new(),
                    model: Some(self.model_id.clone()),
                    temperature: Some(0.0),
                    top_p: Some(self.top_p),
                })
                .await?;

            match parse_react(&response.content) {
                ReActStep::FinalAnswer(answer) | ReActStep::Plain(answer) => {
                    return Ok((answer, produced));
                }
                ReActStep::Action { name, input } => {
                    best_effort = response.content.clone();

                    let call_id = ToolCall::generate_id();
                    let assistant = Message::assistant(response.content.clone());
                    messages.push(assistant.clone());
                    produced.push(assistant);

                    let output = self.tools.execute(&name, input).await;
                    let observation = Message::tool_result(&call_id, &name, output.clone());
                    produced.push(observation);
                    messages.push(Message::user(format!("Observation: {}", output)));
                }
            }
        }

        tracing::warn!(
            agent = self.persona.agent_id,
            max_steps = self.max_steps,
            "react loop hit step bound"
        );
        Ok((best_effort, produced))
    }
}

#[async_trait]
impl Agent for ReActAgent {
    fn id(&self) -> &str {
        self.persona.agent_id
    }

    async fn invoke(&self, slice: AgentSlice) -> DispatchResult<AgentOutcome> {
        let Some(query) = slice
            .messages
            .iter()
            .rev()
            .find_map(|m| (m.role == Role::User && !m.content.is_empty()).then(|| m.content.clone()))
        else {
            return Ok(AgentOutcome {
                messages: vec![Message::assistant(self.persona.empty_reply)],
                ..Default::default()
            });
        };

        let verdict = self.services.guardrails.guard_input(&query);
        if !verdict.passed {
            return Ok(AgentOutcome {
                messages: vec![Message::assistant(self.persona.guarded_reply)],
                ..Default::default()
            });
        }

        let chunks = self
            .services
            .retriever
            .retrieve(&query, RETRIEVE_TOP_K, self.persona.retrieval_filters.as_ref())
            .await?;
        let doc_context = join_context(&chunks);
        let history_context = format_last_n(&slice.messages, HISTORY_TURNS);

        let prompt = vec![
            Message::system(self.system_prompt()),
            Message::user(format!(
                "Conversation history (for issue handling):\n{}\n\n\
                 Document context:\n{}\n\n\
                 Current user message: {}",
                history_context, doc_context, query
            )),
        ];

        let (reply, mut produced) = self.react_loop(prompt).await?;
        let filtered = self.services.guardrails.guard_output(&reply).filtered_text;
        let (resolved, needs_escalation) = (self.persona.assess)(&filtered);

        produced.push(Message::assistant(filtered));

        Ok(AgentOutcome {
            messages: produced,
            resolved,
            needs_escalation,
            last_rag_context: doc_context,
        })
    }
}

/// Parse one LLM turn of the ReAct protocol
fn parse_react(text: &str) -> ReActStep {
    if let Some(idx) = text.find("Final Answer:") {
        let answer = text[idx + "Final Answer:".len()..].trim().to_string();
        return ReActStep::FinalAnswer(answer);
    }

    let mut action: Option<String> = None;
    let mut input_raw: Option<String> = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Action:") {
            action = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Action Input:") {
            input_raw = Some(rest.trim().to_string());
        }
    }

    match action {
        Some(name) if !name.is_empty() => {
            let input = match input_raw {
                Some(raw) => parse_action_input(&raw),
                None => json!({}),
            };
            ReActStep::Action { name, input }
        }
        _ => ReActStep::Plain(text.trim().to_string()),
    }
}

/// Action Input is JSON when possible; scalars are wrapped under "input"
fn parse_action_input(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if value.is_object() => value,
        Ok(value) => json!({ "input": value }),
        Err(_) => json!({ "input": raw }),
    }
}
