//! Supervisor state and escalation types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{last_content, Message, Role};

/// Why a turn was escalated to a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// No escalation
    #[default]
    None,
    /// Reply was not grounded in the retrieved context
    LowFaithfulness,
    /// The agent's reply asked for human follow-up
    AgentRequested,
    /// Agent invocation (and failover, if any) failed
    InvocationFailed,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationReason::None => write!(f, "none"),
            EscalationReason::LowFaithfulness => write!(f, "low_faithfulness"),
            EscalationReason::AgentRequested => write!(f, "agent_requested"),
            EscalationReason::InvocationFailed => write!(f, "invocation_failed"),
        }
    }
}

/// Per-session supervisor state, checkpointed between turns.
///
/// `messages` is bounded: only the most recent entries (per
/// `messages_max_len`) survive the end-of-turn save. Transient routing
/// fields are reset when a new turn is merged in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorState {
    /// Conversation history (bounded)
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Session this state belongs to
    #[serde(default)]
    pub session_id: String,
    /// User the session belongs to
    #[serde(default)]
    pub user_id: String,
    /// Router suggestions for the current turn
    #[serde(default)]
    pub suggested_agent_ids: Vec<String>,
    /// Planner selection for the current turn (wins over suggestions)
    #[serde(default)]
    pub planned_agent_ids: Vec<String>,
    /// Agent chosen by the route node
    #[serde(default)]
    pub current_agent: String,
    /// Retrieved context from the most recent invocation
    #[serde(default)]
    pub last_rag_context: String,
    /// Whether this turn should take the escalate branch
    #[serde(default)]
    pub needs_escalation: bool,
    /// Why escalation was requested
    #[serde(default)]
    pub escalation_reason: EscalationReason,
    /// Heuristic: the agent believes the issue is resolved
    #[serde(default)]
    pub resolved: bool,
    /// Free-form session metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl SupervisorState {
    /// Begin a new turn: append the user message, install this turn's
    /// router suggestions and clear all transient per-turn fields.
    pub fn begin_turn(&mut self, user_message: Message, suggested_agent_ids: Vec<String>) {
        self.messages.push(user_message);
        self.suggested_agent_ids = suggested_agent_ids;
        self.planned_agent_ids.clear();
        self.current_agent.clear();
        self.last_rag_context.clear();
        self.needs_escalation = false;
        self.escalation_reason = EscalationReason::None;
    }

    /// Content of the most recent user message
    pub fn last_user_message(&self) -> Option<&str> {
        last_content(&self.messages, Role::User)
    }

    /// Content of the most recent assistant message
    pub fn last_assistant_message(&self) -> Option<&str> {
        last_content(&self.messages, Role::Assistant)
    }

    /// Keep only the most recent `max_len` messages
    pub fn truncate_messages(&mut self, max_len: usize) {
        if self.messages.len() > max_len {
            let drop = self.messages.len() - max_len;
            self.messages.drain(0..drop);
        }
    }
}

/// The state slice handed to an agent for one invocation
#[derive(Debug, Clone)]
pub struct AgentSlice {
    pub messages: Vec<Message>,
    pub session_id: String,
    pub user_id: String,
}

impl AgentSlice {
    pub fn from_state(state: &SupervisorState) -> Self {
        Self {
            messages: state.messages.clone(),
            session_id: state.session_id.clone(),
            user_id: state.user_id.clone(),
        }
    }
}

/// What an agent invocation returns: new messages plus resolution flags
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    /// Messages produced this invocation (tool traffic + final reply)
    pub messages: Vec<Message>,
    /// The agent believes the issue is resolved
    pub resolved: bool,
    /// The agent requested escalation
    pub needs_escalation: bool,
    /// Retrieved context used for the reply
    pub last_rag_context: String,
}

/// Context handed to the HITL handler when a turn escalates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationContext {
    pub session_id: String,
    pub user_id: String,
    pub reason: EscalationReason,
    pub last_user_message: Option<String>,
    pub last_agent_message: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}
