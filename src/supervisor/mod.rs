//! Supervisor state machine: plan → route → invoke → aggregate → escalate
//!
//! Nodes are functions returning state deltas; the driver merges each delta
//! and picks the next node from a static transition table. Per-session
//! state is loaded from the checkpointer at the start of a turn and saved
//! (bounded) at the end; concurrent turns for the same session serialize on
//! a per-session lock.

mod checkpoint;

pub use checkpoint::{Checkpointer, InMemoryCheckpointer};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::domain::{
    AgentOutcome, AgentSlice, EscalationContext, EscalationReason, Message, SupervisorState,
};
use crate::error::{DispatchError, DispatchResult};
use crate::faithfulness::FaithfulnessScorer;
use crate::hitl::HitlHandler;
use crate::llm::{ChatBackend, ChatRequest};
use crate::ops::CircuitBreaker;
use crate::registry::AgentRegistry;

/// Fixed reply appended when a turn escalates
pub const ESCALATION_MESSAGE: &str = "I'm connecting you with a human agent. Please hold.";

/// Fixed reply when the agent (and failover) could not be invoked
pub const FAILURE_MESSAGE: &str =
    "I'm sorry, I'm having trouble right now. Please try again in a moment or contact support directly.";

/// Fallback when a turn somehow produced no assistant message
pub const EMPTY_REPLY_MESSAGE: &str = "I couldn't generate a response. Please try again.";

/// Result of one supervised turn
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub session_id: String,
    pub reply: String,
    pub agent_id: Option<String>,
    pub needs_escalation: bool,
    pub escalation_reason: EscalationReason,
}

/// Supervisor nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Plan,
    Route,
    Invoke,
    Aggregate,
    Escalate,
    End,
}

/// Static transition table; only aggregate branches
fn next_node(node: Node, state: &SupervisorState) -> Node {
    match node {
        Node::Plan => Node::Route,
        Node::Route => Node::Invoke,
        Node::Invoke => Node::Aggregate,
        Node::Aggregate => {
            if state.needs_escalation {
                Node::Escalate
            } else {
                Node::End
            }
        }
        Node::Escalate | Node::End => Node::End,
    }
}

/// What one node changed. Deltas only append messages and set fields; no
/// node observes state from a later node.
#[derive(Debug, Default)]
struct StateDelta {
    messages: Vec<Message>,
    planned_agent_ids: Option<Vec<String>>,
    current_agent: Option<String>,
    resolved: Option<bool>,
    needs_escalation: Option<bool>,
    escalation_reason: Option<EscalationReason>,
    last_rag_context: Option<String>,
}

fn apply_delta(state: &mut SupervisorState, delta: StateDelta) {
    state.messages.extend(delta.messages);
    if let Some(planned) = delta.planned_agent_ids {
        state.planned_agent_ids = planned;
    }
    if let Some(agent) = delta.current_agent {
        state.current_agent = agent;
    }
    if let Some(resolved) = delta.resolved {
        state.resolved = resolved;
    }
    if let Some(needs) = delta.needs_escalation {
        state.needs_escalation = needs;
    }
    if let Some(reason) = delta.escalation_reason {
        state.escalation_reason = reason;
    }
    if let Some(context) = delta.last_rag_context {
        state.last_rag_context = context;
    }
}

/// Per-session orchestrator over the registered agents
pub struct Supervisor {
    registry: Arc<AgentRegistry>,
    checkpointer: Arc<dyn Checkpointer>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    hitl: Arc<dyn HitlHandler>,
    scorer: Arc<dyn FaithfulnessScorer>,
    backend: Arc<dyn ChatBackend>,
    planning_enabled: bool,
    faithfulness_threshold: f32,
    failover_enabled: bool,
    fallback_agent_id: String,
    invocation_timeout: Duration,
    messages_max_len: usize,
    model_id: String,
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<AgentRegistry>,
        checkpointer: Arc<dyn Checkpointer>,
        circuit_breaker: Option<Arc<CircuitBreaker>>,
        hitl: Arc<dyn HitlHandler>,
        scorer: Arc<dyn FaithfulnessScorer>,
        backend: Arc<dyn ChatBackend>,
        settings: &Settings,
    ) -> Self {
        Self {
            registry,
            checkpointer,
            circuit_breaker: if settings.agent_ops.enabled {
                circuit_breaker
            } else {
                None
            },
            hitl,
            scorer,
            backend,
            planning_enabled: settings.supervisor.planning_enabled,
            faithfulness_threshold: settings.faithfulness.threshold,
            failover_enabled: settings.agent_ops.failover_enabled,
            fallback_agent_id: settings.agent_ops.failover_fallback_agent_id.clone(),
            invocation_timeout: Duration::from_secs(
                settings.agent_ops.agent_invocation_timeout_seconds,
            ),
            messages_max_len: settings.supervisor.messages_max_len,
            model_id: settings.llm.model.clone(),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one turn for a session. Internal failures never surface: every
    /// path ends in a user-facing reply.
    pub async fn run_turn(
        &self,
        user_id: &str,
        message: &str,
        session_id: &str,
        suggested_agent_ids: Vec<String>,
    ) -> TurnResult {
        // Serialize turns per session so message history never interleaves
        let _guard = self.session_lock(session_id).await;

        let mut state = match self.checkpointer.get(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => SupervisorState::default(),
            Err(e) => {
                error!(session = session_id, error = %e, "checkpoint load failed, using fresh state");
                SupervisorState::default()
            }
        };
        state.session_id = session_id.to_string();
        state.user_id = user_id.to_string();
        state.begin_turn(Message::user(message), suggested_agent_ids);

        let mut node = Node::Plan;
        while node != Node::End {
            let delta = match node {
                Node::Plan => self.plan_node(&state).await,
                Node::Route => self.route_node(&state),
                Node::Invoke => self.invoke_node(&state).await,
                Node::Aggregate => self.aggregate_node(&state),
                Node::Escalate => self.escalate_node(&state).await,
                Node::End => unreachable!(),
            };
            apply_delta(&mut state, delta);
            node = next_node(node, &state);
        }

        state.truncate_messages(self.messages_max_len);

        let result = TurnResult {
            session_id: session_id.to_string(),
            reply: state
                .last_assistant_message()
                .unwrap_or(EMPTY_REPLY_MESSAGE)
                .to_string(),
            agent_id: (!state.current_agent.is_empty()).then(|| state.current_agent.clone()),
            needs_escalation: state.needs_escalation,
            escalation_reason: state.escalation_reason,
        };

        if let Err(e) = self.checkpointer.put(session_id, state).await {
            error!(session = session_id, error = %e, "checkpoint save failed");
        }

        result
    }

    /// When planning is enabled, ask the LLM which registered agent should
    /// handle the turn. Failures leave the plan empty and never block.
    async fn plan_node(&self, state: &SupervisorState) -> StateDelta {
        if !self.planning_enabled {
            return StateDelta::default();
        }
        let Some(user_text) = state.last_user_message() else {
            return StateDelta::default();
        };
        let user_text: String = user_text.chars().take(500).collect();
        let available = self.registry.agent_ids();

        let prompt = format!(
            "User message: {}\nSuggested agents from router: {:?}\nAvailable agents: {:?}. \
             Which single agent should handle this? Reply with exactly one word.",
            user_text, state.suggested_agent_ids, available
        );
        let request = ChatRequest {
            messages: vec![
                Message::system(format!(
                    "You are a router. Reply with only one word, one of: {}.",
                    available.join(", ")
                )),
                Message::user(prompt),
            ],
            tools: Vec::new(),
            model: Some(self.model_id.clone()),
            temperature: Some(0.0),
            top_p: None,
        };

        match self.backend.chat(request).await {
            Ok(response) => {
                let text = response.content.to_lowercase();
                let chosen = available
                    .iter()
                    .find(|id| text.split(|c: char| !c.is_alphanumeric()).any(|t| t == id.as_str()));
                match chosen {
                    Some(id) => {
                        debug!(agent = %id, "planner selected agent");
                        StateDelta {
                            planned_agent_ids: Some(vec![id.clone()]),
                            ..Default::default()
                        }
                    }
                    None => StateDelta::default(),
                }
            }
            Err(e) => {
                debug!(error = %e, "planner call failed, continuing without plan");
                StateDelta::default()
            }
        }
    }

    /// Pick the agent for this turn. The planner's choice wins over the
    /// router's; open circuits are skipped; when every candidate is
    /// circuit-open the original list is kept so the turn is not starved.
    fn route_node(&self, state: &SupervisorState) -> StateDelta {
        let mut candidates: Vec<String> = if !state.planned_agent_ids.is_empty() {
            state.planned_agent_ids.clone()
        } else {
            state.suggested_agent_ids.clone()
        };
        if candidates.is_empty() {
            candidates.push(self.fallback_agent_id.clone());
        }

        let current = match &self.circuit_breaker {
            Some(cb) => candidates
                .iter()
                .find(|id| self.registry.is_registered(id) && cb.is_available(id))
                .cloned()
                .or_else(|| {
                    // Every suggested circuit is open: prefer the healthy
                    // fallback, else keep the original list rather than
                    // starve the turn.
                    if self.registry.is_registered(&self.fallback_agent_id)
                        && cb.is_available(&self.fallback_agent_id)
                    {
                        Some(self.fallback_agent_id.clone())
                    } else {
                        candidates
                            .iter()
                            .find(|id| self.registry.is_registered(id))
                            .cloned()
                    }
                }),
            None => candidates
                .iter()
                .find(|id| self.registry.is_registered(id))
                .cloned(),
        };

        StateDelta {
            current_agent: Some(current.unwrap_or_else(|| self.fallback_agent_id.clone())),
            ..Default::default()
        }
    }

    async fn try_invoke(&self, agent_id: &str, slice: AgentSlice) -> DispatchResult<AgentOutcome> {
        let agent = self
            .registry
            .get(agent_id)
            .ok_or_else(|| DispatchError::AgentNotFound(agent_id.to_string()))?;

        match tokio::time::timeout(self.invocation_timeout, agent.invoke(slice)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::InvocationTimeout(
                self.invocation_timeout.as_secs(),
            )),
        }
    }

    fn outcome_delta(outcome: AgentOutcome, agent_id: Option<String>) -> StateDelta {
        let escalation_reason = outcome
            .needs_escalation
            .then_some(EscalationReason::AgentRequested);
        StateDelta {
            messages: outcome.messages,
            current_agent: agent_id,
            resolved: Some(outcome.resolved),
            needs_escalation: Some(outcome.needs_escalation),
            escalation_reason,
            last_rag_context: Some(outcome.last_rag_context),
            ..Default::default()
        }
    }

    fn failure_delta() -> StateDelta {
        StateDelta {
            messages: vec![Message::assistant(FAILURE_MESSAGE)],
            resolved: Some(false),
            needs_escalation: Some(true),
            escalation_reason: Some(EscalationReason::InvocationFailed),
            last_rag_context: Some(String::new()),
            ..Default::default()
        }
    }

    /// Invoke the routed agent; on failure record it and fail over once to
    /// the fallback agent. When everything fails the user still gets a
    /// friendly reply and the turn escalates.
    async fn invoke_node(&self, state: &SupervisorState) -> StateDelta {
        let agent_id = if state.current_agent.is_empty() {
            self.fallback_agent_id.clone()
        } else {
            state.current_agent.clone()
        };
        let slice = AgentSlice::from_state(state);

        match self.try_invoke(&agent_id, slice.clone()).await {
            Ok(outcome) => {
                if let Some(cb) = &self.circuit_breaker {
                    cb.record_success(&agent_id);
                }
                Self::outcome_delta(outcome, None)
            }
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "agent invocation failed");
                if let Some(cb) = &self.circuit_breaker {
                    cb.record_failure(&agent_id);
                }

                let can_fail_over = self.failover_enabled
                    && agent_id != self.fallback_agent_id
                    && self.registry.is_registered(&self.fallback_agent_id);
                if !can_fail_over {
                    return Self::failure_delta();
                }

                info!(from = %agent_id, to = %self.fallback_agent_id, "failing over");
                match self.try_invoke(&self.fallback_agent_id, slice).await {
                    Ok(outcome) => {
                        if let Some(cb) = &self.circuit_breaker {
                            cb.record_success(&self.fallback_agent_id);
                        }
                        Self::outcome_delta(outcome, Some(self.fallback_agent_id.clone()))
                    }
                    Err(e2) => {
                        warn!(agent = %self.fallback_agent_id, error = %e2, "failover invocation failed");
                        if let Some(cb) = &self.circuit_breaker {
                            cb.record_failure(&self.fallback_agent_id);
                        }
                        Self::failure_delta()
                    }
                }
            }
        }
    }

    /// Score the reply against the retrieved context; low faithfulness
    /// escalates. Ties at the threshold do not.
    fn aggregate_node(&self, state: &SupervisorState) -> StateDelta {
        let Some(response) = state.last_assistant_message() else {
            return StateDelta::default();
        };
        if response.is_empty() {
            return StateDelta::default();
        }

        let score = self.scorer.score(response, &state.last_rag_context);
        if score < self.faithfulness_threshold {
            info!(
                session = %state.session_id,
                score,
                threshold = self.faithfulness_threshold,
                "reply below faithfulness threshold, escalating"
            );
            return StateDelta {
                needs_escalation: Some(true),
                escalation_reason: Some(EscalationReason::LowFaithfulness),
                ..Default::default()
            };
        }
        StateDelta::default()
    }

    /// Hand the escalation to the HITL handler (failures are logged, never
    /// fatal) and append the fixed hold message.
    async fn escalate_node(&self, state: &SupervisorState) -> StateDelta {
        let reason = if state.escalation_reason == EscalationReason::None {
            EscalationReason::AgentRequested
        } else {
            state.escalation_reason
        };

        let ctx = EscalationContext {
            session_id: state.session_id.clone(),
            user_id: state.user_id.clone(),
            reason,
            last_user_message: state.last_user_message().map(|s| s.to_string()),
            last_agent_message: state.last_assistant_message().map(|s| s.to_string()),
            metadata: state.metadata.clone(),
        };

        if let Err(e) = self.hitl.on_escalate(&ctx).await {
            warn!(session = %state.session_id, error = %e, "HITL handler failed");
        }

        StateDelta {
            messages: vec![Message::assistant(ESCALATION_MESSAGE)],
            escalation_reason: Some(reason),
            ..Default::default()
        }
    }

    async fn session_lock(&self, session_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.session_locks.lock().unwrap();
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{build_registry, Agent, AgentServices};
    use crate::domain::{Role, ToolCall};
    use crate::faithfulness::NullScorer;
    use crate::guardrails::Guardrails;
    use crate::hitl::{PendingEscalations, StubHitlHandler, TicketHitlHandler};
    use crate::llm::{ChatResponse, ScriptItem, ScriptedBackend};
    use crate::retrieval::StubRetriever;
    use crate::tools::support::support_tools;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedScorer(f32);

    impl FaithfulnessScorer for FixedScorer {
        fn score(&self, _response: &str, _context: &str) -> f32 {
            self.0
        }
    }

    struct EchoAgent {
        id: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn id(&self) -> &str {
            self.id
        }

        async fn invoke(&self, _slice: AgentSlice) -> DispatchResult<AgentOutcome> {
            Ok(AgentOutcome {
                messages: vec![Message::assistant(self.reply)],
                resolved: true,
                needs_escalation: false,
                last_rag_context: "echo context".into(),
            })
        }
    }

    struct FailingAgent(&'static str);

    #[async_trait]
    impl Agent for FailingAgent {
        fn id(&self) -> &str {
            self.0
        }

        async fn invoke(&self, _slice: AgentSlice) -> DispatchResult<AgentOutcome> {
            Err(DispatchError::Internal("agent exploded".into()))
        }
    }

    fn services(backend: Arc<ScriptedBackend>) -> AgentServices {
        let settings = Settings::default();
        AgentServices {
            backend,
            retriever: Arc::new(StubRetriever),
            guardrails: Arc::new(Guardrails::new(settings.guardrails)),
        }
    }

    struct SupervisorBuilder {
        registry: Arc<AgentRegistry>,
        backend: Arc<ScriptedBackend>,
        scorer: Arc<dyn FaithfulnessScorer>,
        hitl: Arc<dyn HitlHandler>,
        settings: Settings,
        circuit_breaker: Option<Arc<CircuitBreaker>>,
    }

    impl SupervisorBuilder {
        fn with_real_agents(backend: Arc<ScriptedBackend>) -> Self {
            let settings = Settings::default();
            let registry = Arc::new(build_registry(&settings, services(backend.clone()), vec![]));
            Self {
                registry,
                backend,
                scorer: Arc::new(NullScorer),
                hitl: Arc::new(StubHitlHandler),
                settings,
                circuit_breaker: Some(Arc::new(CircuitBreaker::new(3, Duration::from_secs(60)))),
            }
        }

        fn with_registry(registry: AgentRegistry) -> Self {
            let backend = Arc::new(ScriptedBackend::new(vec![]));
            Self {
                registry: Arc::new(registry),
                backend,
                scorer: Arc::new(NullScorer),
                hitl: Arc::new(StubHitlHandler),
                settings: Settings::default(),
                circuit_breaker: Some(Arc::new(CircuitBreaker::new(3, Duration::from_secs(60)))),
            }
        }

        fn build(self) -> Supervisor {
            Supervisor::new(
                self.registry,
                Arc::new(InMemoryCheckpointer::new(Duration::from_secs(3600))),
                self.circuit_breaker,
                self.hitl,
                self.scorer,
                self.backend,
                &self.settings,
            )
        }
    }

    #[tokio::test]
    async fn billing_happy_path_with_tools() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![
                    ToolCall::new("c1", "look_up_invoice", json!({"invoice_id": "INV-1"})),
                    ToolCall::new("c2", "get_refund_status", json!({"refund_id": "INV-1"})),
                ],
            },
            ChatResponse {
                content: "Invoice INV-1 is paid; the refund is processing.".into(),
                tool_calls: vec![],
            },
        ]));
        let supervisor = SupervisorBuilder::with_real_agents(backend).build();

        let result = supervisor
            .run_turn("u1", "I need a refund for invoice INV-1", "s1", vec!["billing".into()])
            .await;

        assert_eq!(result.agent_id.as_deref(), Some("billing"));
        assert!(result.reply.contains("processing"));
        assert!(!result.needs_escalation);
    }

    #[tokio::test]
    async fn open_circuit_routes_to_fallback_without_invoking() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "Support here.",
        }));
        registry.add_agent(Arc::new(FailingAgent("billing")));

        let cb = Arc::new(CircuitBreaker::new(1, Duration::from_secs(600)));
        cb.record_failure("billing"); // threshold 1: circuit opens

        let mut builder = SupervisorBuilder::with_registry(registry);
        builder.circuit_breaker = Some(cb.clone());
        let supervisor = builder.build();

        let result = supervisor
            .run_turn("u1", "invoice help", "s1", vec!["billing".into()])
            .await;

        assert_eq!(result.agent_id.as_deref(), Some("support"));
        assert_eq!(result.reply, "Support here.");
        // Billing was never invoked: its failure count is unchanged
        assert_eq!(cb.snapshot("billing").consecutive_failures, 1);
    }

    #[tokio::test]
    async fn invoke_failure_fails_over_once() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(FailingAgent("billing")));
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "Fallback reply.",
        }));

        let cb = Arc::new(CircuitBreaker::new(3, Duration::from_secs(60)));
        let mut builder = SupervisorBuilder::with_registry(registry);
        builder.circuit_breaker = Some(cb.clone());
        let supervisor = builder.build();

        let result = supervisor
            .run_turn("u1", "refund please", "s1", vec!["billing".into()])
            .await;

        assert_eq!(result.agent_id.as_deref(), Some("support"));
        assert_eq!(result.reply, "Fallback reply.");
        assert!(!result.needs_escalation);
        assert_eq!(cb.snapshot("billing").consecutive_failures, 1);
        assert_eq!(cb.snapshot("support").consecutive_failures, 0);
    }

    #[tokio::test]
    async fn all_invocations_failing_escalates_with_friendly_reply() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(FailingAgent("billing")));
        registry.add_agent(Arc::new(FailingAgent("support")));

        let supervisor = SupervisorBuilder::with_registry(registry).build();
        let result = supervisor
            .run_turn("u1", "refund please", "s1", vec!["billing".into()])
            .await;

        assert!(result.needs_escalation);
        assert_eq!(result.escalation_reason, EscalationReason::InvocationFailed);
        assert_eq!(result.reply, ESCALATION_MESSAGE);
    }

    #[tokio::test]
    async fn low_faithfulness_escalates_and_queues_ticket() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "billing",
            reply: "Your payment was $999.",
        }));
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "ok",
        }));

        let pending = PendingEscalations::default();
        let ticket_tool = support_tools()
            .into_iter()
            .find(|t| t.name() == "create_support_ticket")
            .unwrap();

        let mut builder = SupervisorBuilder::with_registry(registry);
        builder.scorer = Arc::new(FixedScorer(0.3));
        builder.hitl = Arc::new(TicketHitlHandler::new(pending.clone(), ticket_tool));
        let supervisor = builder.build();

        let result = supervisor
            .run_turn("u1", "Was my payment $999?", "s1", vec!["billing".into()])
            .await;

        assert!(result.needs_escalation);
        assert_eq!(result.escalation_reason, EscalationReason::LowFaithfulness);
        assert_eq!(result.reply, ESCALATION_MESSAGE);
        let queued = pending.list_pending();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].session_id, "s1");
    }

    #[tokio::test]
    async fn score_at_threshold_does_not_escalate() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "On the line.",
        }));

        let mut builder = SupervisorBuilder::with_registry(registry);
        builder.scorer = Arc::new(FixedScorer(0.8));
        let supervisor = builder.build();

        let result = supervisor.run_turn("u1", "hi", "s1", vec!["support".into()]).await;
        assert!(!result.needs_escalation);
        assert_eq!(result.reply, "On the line.");
    }

    #[tokio::test]
    async fn hitl_failure_still_returns_escalation_message() {
        struct FailingHandler;

        #[async_trait]
        impl HitlHandler for FailingHandler {
            async fn on_escalate(&self, _ctx: &EscalationContext) -> DispatchResult<()> {
                Err(DispatchError::Escalation("handler down".into()))
            }
        }

        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "hm",
        }));

        let mut builder = SupervisorBuilder::with_registry(registry);
        builder.scorer = Arc::new(FixedScorer(0.1));
        builder.hitl = Arc::new(FailingHandler);
        let supervisor = builder.build();

        let result = supervisor.run_turn("u1", "hi", "s1", vec!["support".into()]).await;
        assert!(result.needs_escalation);
        assert_eq!(result.reply, ESCALATION_MESSAGE);
    }

    #[tokio::test]
    async fn state_persists_across_turns() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ChatResponse {
                content: "First reply.".into(),
                tool_calls: vec![],
            },
            ChatResponse {
                content: "Second reply.".into(),
                tool_calls: vec![],
            },
        ]));
        let supervisor = SupervisorBuilder::with_real_agents(backend.clone()).build();

        supervisor
            .run_turn("u1", "hello", "s1", vec!["support".into()])
            .await;
        supervisor
            .run_turn("u1", "more help", "s1", vec!["support".into()])
            .await;

        // Second invocation saw the first turn in its history section
        let calls = backend.recorded_calls();
        let second_prompt = &calls[1].messages[1].content;
        assert!(second_prompt.contains("User: hello"));
        assert!(second_prompt.contains("Agent: First reply."));
    }

    #[tokio::test]
    async fn planner_choice_wins_over_router() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "billing",
            reply: "Billing here.",
        }));
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "Support here.",
        }));

        let mut builder = SupervisorBuilder::with_registry(registry);
        builder.settings.supervisor.planning_enabled = true;
        builder.backend = Arc::new(ScriptedBackend::new(vec![ChatResponse {
            content: "billing".into(),
            tool_calls: vec![],
        }]));
        let supervisor = builder.build();

        let result = supervisor
            .run_turn("u1", "I have a question", "s1", vec!["support".into()])
            .await;
        assert_eq!(result.agent_id.as_deref(), Some("billing"));
        assert_eq!(result.reply, "Billing here.");
    }

    #[tokio::test]
    async fn planner_failure_is_a_no_op() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "Support here.",
        }));

        let mut builder = SupervisorBuilder::with_registry(registry);
        builder.settings.supervisor.planning_enabled = true;
        builder.backend = Arc::new(ScriptedBackend::from_script(vec![ScriptItem::Fail]));
        let supervisor = builder.build();

        let result = supervisor
            .run_turn("u1", "hello", "s1", vec!["support".into()])
            .await;
        assert_eq!(result.agent_id.as_deref(), Some("support"));
        assert_eq!(result.reply, "Support here.");
    }

    #[tokio::test]
    async fn empty_suggestions_default_to_support() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "Default pool.",
        }));

        let supervisor = SupervisorBuilder::with_registry(registry).build();
        let result = supervisor.run_turn("u1", "hi", "s1", vec![]).await;
        assert_eq!(result.agent_id.as_deref(), Some("support"));
    }

    #[tokio::test]
    async fn unregistered_suggestion_falls_back() {
        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "Default pool.",
        }));

        let supervisor = SupervisorBuilder::with_registry(registry).build();
        let result = supervisor
            .run_turn("u1", "broken printer", "s1", vec!["tech".into()])
            .await;
        assert_eq!(result.agent_id.as_deref(), Some("support"));
    }

    #[tokio::test]
    async fn messages_are_bounded_after_save() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let supervisor = SupervisorBuilder::with_real_agents(backend).build();

        for i in 0..15 {
            supervisor
                .run_turn("u1", &format!("message {}", i), "s1", vec!["support".into()])
                .await;
        }

        let state = supervisor.checkpointer.get("s1").await.unwrap().unwrap();
        assert!(state.messages.len() <= 20);
    }

    #[tokio::test]
    async fn checkpointer_failure_degrades_gracefully() {
        struct BrokenCheckpointer;

        #[async_trait]
        impl Checkpointer for BrokenCheckpointer {
            async fn get(&self, _thread_id: &str) -> DispatchResult<Option<SupervisorState>> {
                Err(DispatchError::Checkpoint("store down".into()))
            }

            async fn put(&self, _thread_id: &str, _state: SupervisorState) -> DispatchResult<()> {
                Err(DispatchError::Checkpoint("store down".into()))
            }

            async fn delete(&self, _thread_id: &str) -> DispatchResult<()> {
                Err(DispatchError::Checkpoint("store down".into()))
            }
        }

        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EchoAgent {
            id: "support",
            reply: "Still here.",
        }));

        let builder = SupervisorBuilder::with_registry(registry);
        let supervisor = Supervisor::new(
            builder.registry,
            Arc::new(BrokenCheckpointer),
            builder.circuit_breaker,
            builder.hitl,
            builder.scorer,
            builder.backend,
            &builder.settings,
        );

        let result = supervisor.run_turn("u1", "hi", "s1", vec!["support".into()]).await;
        assert_eq!(result.reply, "Still here.");
    }

    #[tokio::test]
    async fn agent_requested_escalation_is_preserved() {
        struct EscalatingAgent;

        #[async_trait]
        impl Agent for EscalatingAgent {
            fn id(&self) -> &str {
                "support"
            }

            async fn invoke(&self, _slice: AgentSlice) -> DispatchResult<AgentOutcome> {
                Ok(AgentOutcome {
                    messages: vec![Message::assistant("I will escalate this to a human.")],
                    resolved: false,
                    needs_escalation: true,
                    last_rag_context: "ctx".into(),
                })
            }
        }

        let mut registry = AgentRegistry::new();
        registry.add_agent(Arc::new(EscalatingAgent));

        let supervisor = SupervisorBuilder::with_registry(registry).build();
        let result = supervisor
            .run_turn("u1", "please escalate", "s1", vec!["support".into()])
            .await;

        assert!(result.needs_escalation);
        assert_eq!(result.escalation_reason, EscalationReason::AgentRequested);
        assert_eq!(result.reply, ESCALATION_MESSAGE);

        // The agent reply precedes the escalation message in state
        let state = supervisor.checkpointer.get("s1").await.unwrap().unwrap();
        let tail: Vec<&str> = state
            .messages
            .iter()
            .rev()
            .take(2)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tail[0], ESCALATION_MESSAGE);
        assert_eq!(tail[1], "I will escalate this to a human.");
        assert!(state.messages.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn concurrent_turns_for_same_session_serialize() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let supervisor = Arc::new(SupervisorBuilder::with_real_agents(backend).build());

        let mut handles = Vec::new();
        for i in 0..4 {
            let sup = supervisor.clone();
            handles.push(tokio::spawn(async move {
                sup.run_turn("u1", &format!("turn {}", i), "s1", vec!["support".into()])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = supervisor.checkpointer.get("s1").await.unwrap().unwrap();
        // 4 user + 4 assistant messages, no interleaving lost any of them
        assert_eq!(state.messages.len(), 8);
        let mut roles = state.messages.iter().map(|m| m.role);
        for _ in 0..4 {
            assert_eq!(roles.next(), Some(Role::User));
            assert_eq!(roles.next(), Some(Role::Assistant));
        }
    }
}
