//! Agents: bounded turn handlers combining retrieval, an LLM call and tools

mod react;
mod runner;

pub use react::ReActAgent;
pub use runner::ToolCallingAgent;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Settings;
use crate::domain::{AgentOutcome, AgentSlice};
use crate::error::DispatchResult;
use crate::guardrails::Guardrails;
use crate::llm::ChatBackend;
use crate::registry::{AgentProfile, AgentRegistry};
use crate::retrieval::Retriever;
use crate::tools::{billing::billing_tools, support::support_tools, Tool, ToolSet};

/// A bounded turn handler for a specific domain
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent id this handler serves
    fn id(&self) -> &str;

    /// Run one turn over the given state slice
    async fn invoke(&self, slice: AgentSlice) -> DispatchResult<AgentOutcome>;
}

/// Heuristic read of the final reply: (resolved, needs_escalation)
pub type ReplyAssessor = fn(&str) -> (bool, bool);

/// Static persona for one agent: prompt, canned replies, reply heuristics
#[derive(Clone)]
pub struct AgentPersona {
    pub agent_id: &'static str,
    pub system_prompt: &'static str,
    /// Reply when guardrails reject the input
    pub guarded_reply: &'static str,
    /// Reply when the turn carries no user message
    pub empty_reply: &'static str,
    /// Retrieval filters scoping this agent's document space
    pub retrieval_filters: Option<Value>,
    pub assess: ReplyAssessor,
}

/// Support persona: general help, FAQ
pub fn support_persona() -> AgentPersona {
    AgentPersona {
        agent_id: "support",
        system_prompt: "You are a helpful support agent. Answer based on the context when possible. \
            Use the conversation history to understand the ongoing issue and avoid repeating yourself. \
            Use search_knowledge_base for FAQs and how-to questions. Use create_support_ticket when the user needs human follow-up. \
            If unsure, say so and suggest escalating to a human. Keep replies concise.",
        guarded_reply: "I can only help with support questions. Please ask about our products, FAQ, or how to get assistance.",
        empty_reply: "I didn't receive a message. How can I help?",
        retrieval_filters: Some(json!({"domain": "support"})),
        assess: assess_support_reply,
    }
}

/// Billing persona: invoices, payments, refunds
pub fn billing_persona() -> AgentPersona {
    AgentPersona {
        agent_id: "billing",
        system_prompt: "You are a billing support agent. Help with invoices, payments, refunds. \
            Use the conversation history to understand the ongoing issue (e.g. invoice ID, order ID mentioned earlier). \
            Use look_up_invoice when the user asks about an invoice. Use get_refund_status for refund inquiries. Use create_refund_request when the user wants a refund. \
            Answer based on context. For sensitive actions, advise contacting billing team.",
        guarded_reply: "I can only help with billing, invoices, payments, and refunds. Please ask a billing-related question.",
        empty_reply: "I didn't receive a message. How can I help with billing?",
        retrieval_filters: Some(json!({"domain": "billing"})),
        assess: assess_billing_reply,
    }
}

fn assess_support_reply(reply: &str) -> (bool, bool) {
    let lower = reply.to_lowercase();
    let resolved = !lower.contains("unsure") && !lower.contains("escalat");
    let needs_escalation = lower.contains("escalat") || lower.contains("ticket");
    (resolved, needs_escalation)
}

fn assess_billing_reply(reply: &str) -> (bool, bool) {
    let lower = reply.to_lowercase();
    let resolved = !lower.contains("contact");
    let needs_escalation = lower.contains("billing team") || lower.contains("contact");
    (resolved, needs_escalation)
}

/// Shared collaborators handed to every agent
#[derive(Clone)]
pub struct AgentServices {
    pub backend: Arc<dyn ChatBackend>,
    pub retriever: Arc<dyn Retriever>,
    pub guardrails: Arc<Guardrails>,
}

/// Build the agent registry: profiles for every pool, runnable agents for
/// support and billing. External tools are appended to each agent's
/// built-ins (services are constructed first, tools second, agents last).
pub fn build_registry(
    settings: &Settings,
    services: AgentServices,
    external_tools: Vec<Arc<dyn Tool>>,
) -> AgentRegistry {
    let mut registry = AgentRegistry::new();

    let model_id = settings.llm.model.clone();
    registry.add_profile(AgentProfile::new(
        "support",
        &["general", "support", "faq", "help"],
        &model_id,
    ));
    registry.add_profile(AgentProfile::new(
        "billing",
        &["billing", "invoices", "payments", "refunds"],
        &model_id,
    ));
    registry.add_profile(AgentProfile::new(
        "tech",
        &["tech", "technical", "troubleshooting"],
        &model_id,
    ));
    registry.add_profile(AgentProfile::new(
        "escalation",
        &["escalation", "human", "complex"],
        &model_id,
    ));

    let personas = [
        (support_persona(), support_tools()),
        (billing_persona(), billing_tools()),
    ];

    for (persona, built_in) in personas {
        let tools = ToolSet::new(built_in, external_tools.clone());
        let agent: Arc<dyn Agent> = if settings.supervisor.react_enabled {
            Arc::new(ReActAgent::new(persona, services.clone(), tools, settings))
        } else {
            Arc::new(ToolCallingAgent::new(persona, services.clone(), tools, settings))
        };
        registry.add_agent(agent);
    }

    registry
}
