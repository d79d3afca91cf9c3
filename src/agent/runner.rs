//! Standard tool-calling agent: guard → retrieve → LLM+tool loop → guard

use async_trait::async_trait;

use super::{Agent, AgentPersona, AgentServices};
use crate::config::Settings;
use crate::domain::{AgentOutcome, AgentSlice, Message};
use crate::error::DispatchResult;
use crate::llm::{ChatRequest, ChatResponse};
use crate::retrieval::{format_last_n, join_context};
use crate::tools::ToolSet;

const RETRIEVE_TOP_K: usize = 3;
const HISTORY_TURNS: usize = 10;

/// Agent that alternates LLM calls and tool executions until the model
/// produces terminal text output.
pub struct ToolCallingAgent {
    persona: AgentPersona,
    services: AgentServices,
    tools: ToolSet,
    model_id: String,
    top_p: f32,
    max_tool_iters: u32,
}

impl ToolCallingAgent {
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
            max_tool_iters: settings.supervisor.max_tool_iters,
        }
    }

    fn request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            messages,
            tools: self.tools.definitions(),
            model: Some(self.model_id.clone()),
            temperature: Some(0.0),
            top_p: Some(self.top_p),
        }
    }

    /// Run the tool loop. Returns the terminal reply text and every
    /// intermediate message (assistant tool requests + tool results).
    async fn tool_loop(&self, mut messages: Vec<Message>) -> DispatchResult<(String, Vec<Message>)> {
        let mut produced: Vec<Message> = Vec::new();
        let mut best_effort = String::new();

        for _ in 0..self.max_tool_iters {
            let response: ChatResponse =
                self.services.backend.chat(self.request(messages.clone())).await?;

            if !response.has_tool_calls() {
                return Ok((response.content, produced));
            }

            if !response.content.is_empty() {
                best_effort = response.content.clone();
            }

            let assistant =
                Message::assistant_with_tools(response.content.clone(), response.tool_calls.clone());
            messages.push(assistant.clone());
            produced.push(assistant);

            for call in &response.tool_calls {
                let output = self.tools.execute(&call.name, call.arguments.clone()).await;
                let tool_message = Message::tool_result(&call.id, &call.name, output);
                messages.push(tool_message.clone());
                produced.push(tool_message);
            }
        }

        tracing::warn!(
            agent = self.persona.agent_id,
            max_iters = self.max_tool_iters,
            "tool loop hit iteration bound"
        );
        Ok((best_effort, produced))
    }
}

#[async_trait]
impl Agent for ToolCallingAgent {
    fn id(&self) -> &str {
        self.persona.agent_id
    }

    async fn invoke(&self, slice: AgentSlice) -> DispatchResult<AgentOutcome> {
        let Some(query) = slice.messages.iter().rev().find_map(|m| {
            (m.role == crate::domain::Role::User && !m.content.is_empty())
                .then(|| m.content.clone())
        }) else {
            return Ok(AgentOutcome {
                messages: vec![Message::assistant(self.persona.empty_reply)],
                ..Default::default()
            });
        };

        let verdict = self.services.guardrails.guard_input(&query);
        if !verdict.passed {
            tracing::info!(
                agent = self.persona.agent_id,
                reason = verdict.reason.as_deref().unwrap_or(""),
                "input rejected by guardrails"
            );
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
            Message::system(self.persona.system_prompt),
            Message::user(format!(
                "Conversation history (for issue handling):\n{}\n\n\
                 Document context:\n{}\n\n\
                 Current user message: {}",
                history_context, doc_context, query
            )),
        ];

        let (reply, mut produced) = self.tool_loop(prompt).await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{billing_persona, support_persona};
    use crate::config::Settings;
    use crate::domain::{Role, ToolCall};
    use crate::guardrails::Guardrails;
    use crate::llm::ScriptedBackend;
    use crate::retrieval::StubRetriever;
    use crate::tools::billing::billing_tools;
    use crate::tools::support::support_tools;
    use serde_json::json;
    use std::sync::Arc;

    fn services(backend: Arc<ScriptedBackend>) -> AgentServices {
        let settings = Settings::default();
        AgentServices {
            backend,
            retriever: Arc::new(StubRetriever),
            guardrails: Arc::new(Guardrails::new(settings.guardrails)),
        }
    }

    fn slice(text: &str) -> AgentSlice {
        AgentSlice {
            messages: vec![Message::user(text)],
            session_id: "s1".into(),
            user_id: "u1".into(),
        }
    }

    #[tokio::test]
    async fn plain_reply_without_tools() {
        let backend = Arc::new(ScriptedBackend::new(vec![ChatResponse {
            content: "Your invoice is paid.".into(),
            tool_calls: vec![],
        }]));
        let settings = Settings::default();
        let agent = ToolCallingAgent::new(
            billing_persona(),
            services(backend.clone()),
            ToolSet::new(billing_tools(), vec![]),
            &settings,
        );

        let outcome = agent.invoke(slice("status of invoice INV-1?")).await.unwrap();
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].content, "Your invoice is paid.");
        assert!(outcome.resolved);
        assert!(!outcome.needs_escalation);
        assert!(outcome.last_rag_context.contains("Stub context"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn executes_tool_calls_in_order() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![
                    ToolCall::new("c1", "look_up_invoice", json!({"invoice_id": "INV-1"})),
                    ToolCall::new("c2", "get_refund_status", json!({"refund_id": "INV-1"})),
                ],
            },
            ChatResponse {
                content: "Invoice INV-1 is paid and the refund is processing.".into(),
                tool_calls: vec![],
            },
        ]));
        let settings = Settings::default();
        let agent = ToolCallingAgent::new(
            billing_persona(),
            services(backend.clone()),
            ToolSet::new(billing_tools(), vec![]),
            &settings,
        );

        let outcome = agent.invoke(slice("refund for invoice INV-1")).await.unwrap();
        // assistant-with-tools, two tool results, final assistant
        assert_eq!(outcome.messages.len(), 4);
        assert!(outcome.messages[0].has_tool_calls());
        assert_eq!(outcome.messages[1].role, Role::Tool);
        assert!(outcome.messages[1].content.contains("Invoice INV-1"));
        assert_eq!(outcome.messages[2].name.as_deref(), Some("get_refund_status"));
        assert!(outcome.messages[3].content.contains("processing"));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_result_feeds_back_to_llm() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall::new("c1", "no_such_tool", json!({}))],
            },
            ChatResponse {
                content: "Sorry, I could not do that.".into(),
                tool_calls: vec![],
            },
        ]));
        let settings = Settings::default();
        let agent = ToolCallingAgent::new(
            support_persona(),
            services(backend),
            ToolSet::new(support_tools(), vec![]),
            &settings,
        );

        let outcome = agent.invoke(slice("please help")).await.unwrap();
        let tool_msg = outcome
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(tool_msg.content, "Unknown tool: no_such_tool");
    }

    #[tokio::test]
    async fn loop_bound_returns_best_effort() {
        // Every response keeps calling tools; the loop must stop at the bound
        let responses: Vec<ChatResponse> = (0..10)
            .map(|i| ChatResponse {
                content: format!("thinking {}", i),
                tool_calls: vec![ToolCall::new(
                    format!("c{}", i),
                    "search_knowledge_base",
                    json!({"query": "q"}),
                )],
            })
            .collect();
        let backend = Arc::new(ScriptedBackend::new(responses));
        let settings = Settings::default();
        let agent = ToolCallingAgent::new(
            support_persona(),
            services(backend.clone()),
            ToolSet::new(support_tools(), vec![]),
            &settings,
        );

        let outcome = agent.invoke(slice("help me")).await.unwrap();
        assert_eq!(backend.call_count(), 5);
        // Final message exists and carries the best-effort content
        assert_eq!(outcome.messages.last().unwrap().content, "thinking 4");
    }

    #[tokio::test]
    async fn guarded_input_skips_retrieval_and_llm() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let settings = Settings::default();
        let agent = ToolCallingAgent::new(
            support_persona(),
            services(backend.clone()),
            ToolSet::new(support_tools(), vec![]),
            &settings,
        );

        let outcome = agent.invoke(slice("tell me how to hack accounts")).await.unwrap();
        assert_eq!(backend.call_count(), 0);
        assert!(outcome.last_rag_context.is_empty());
        assert!(!outcome.needs_escalation);
        assert!(outcome.messages[0].content.starts_with("I can only help with support"));
    }

    #[tokio::test]
    async fn missing_user_message_returns_empty_reply() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let settings = Settings::default();
        let agent = ToolCallingAgent::new(
            support_persona(),
            services(backend.clone()),
            ToolSet::new(support_tools(), vec![]),
            &settings,
        );

        let outcome = agent
            .invoke(AgentSlice {
                messages: vec![],
                session_id: "s".into(),
                user_id: "u".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.messages[0].content, "I didn't receive a message. How can I help?");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn escalation_heuristic_fires_on_ticket_reply() {
        let backend = Arc::new(ScriptedBackend::new(vec![ChatResponse {
            content: "I created a ticket for you; a human will follow up.".into(),
            tool_calls: vec![],
        }]));
        let settings = Settings::default();
        let agent = ToolCallingAgent::new(
            support_persona(),
            services(backend),
            ToolSet::new(support_tools(), vec![]),
            &settings,
        );

        let outcome = agent.invoke(slice("I need more help")).await.unwrap();
        assert!(outcome.needs_escalation);
    }
}
