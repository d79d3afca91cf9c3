//! Ticket HITL handler: create a support ticket and queue the session for
//! human pickup

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use super::HitlHandler;
use crate::domain::EscalationContext;
use crate::error::DispatchResult;
use crate::tools::Tool;

/// A session waiting for a human agent
#[derive(Debug, Clone, Serialize)]
pub struct PendingEscalation {
    pub session_id: String,
    pub user_id: String,
    pub reason: String,
    pub ticket_ref: Option<String>,
    pub last_user_message: Option<String>,
    /// Unix epoch milliseconds
    pub created_at: u64,
}

/// Process-wide pending escalation queue, keyed by session id.
/// Shared between the ticket handler and the HITL endpoints.
#[derive(Clone, Default)]
pub struct PendingEscalations {
    inner: Arc<Mutex<HashMap<String, PendingEscalation>>>,
}

impl PendingEscalations {
    /// Sessions currently waiting for a human, oldest first
    pub fn list_pending(&self) -> Vec<PendingEscalation> {
        let map = self.inner.lock().unwrap();
        let mut pending: Vec<PendingEscalation> = map.values().cloned().collect();
        pending.sort_by_key(|p| p.created_at);
        pending
    }

    /// Remove a session from pending (a human picked it up).
    /// Returns whether the session was present.
    pub fn clear_pending(&self, session_id: &str) -> bool {
        self.inner.lock().unwrap().remove(session_id).is_some()
    }

    fn insert(&self, escalation: PendingEscalation) {
        self.inner
            .lock()
            .unwrap()
            .insert(escalation.session_id.clone(), escalation);
    }
}

/// Creates a support ticket via the registered ticket tool and records the
/// session in the pending queue so humans can pick it up.
pub struct TicketHitlHandler {
    pending: PendingEscalations,
    ticket_tool: Arc<dyn Tool>,
}

impl TicketHitlHandler {
    pub fn new(pending: PendingEscalations, ticket_tool: Arc<dyn Tool>) -> Self {
        Self {
            pending,
            ticket_tool,
        }
    }
}

#[async_trait]
impl HitlHandler for TicketHitlHandler {
    async fn on_escalate(&self, ctx: &EscalationContext) -> DispatchResult<()> {
        let subject = format!("Escalation: session {} ({})", ctx.session_id, ctx.reason);
        let description = format!(
            "Session: {}\nUser: {}\nReason: {}\nLast user message: {}\nLast agent message: {}",
            ctx.session_id,
            ctx.user_id,
            ctx.reason,
            ctx.last_user_message.as_deref().unwrap_or("(none)"),
            ctx.last_agent_message.as_deref().unwrap_or("(none)"),
        );

        // Ticket creation is best-effort; the session is queued either way
        let ticket_ref = match self
            .ticket_tool
            .call(json!({
                "subject": subject,
                "description": description,
                "priority": "high"
            }))
            .await
        {
            Ok(output) => extract_ticket_ref(&output),
            Err(e) => {
                tracing::warn!(session = %ctx.session_id, error = %e, "ticket creation failed");
                None
            }
        };

        self.pending.insert(PendingEscalation {
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id.clone(),
            reason: ctx.reason.to_string(),
            ticket_ref,
            last_user_message: ctx.last_user_message.clone(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        });

        Ok(())
    }
}

/// Pull the "Ref: XXX-NNN" token out of a ticket tool reply
fn extract_ticket_ref(output: &str) -> Option<String> {
    let idx = output.find("Ref: ")?;
    let rest = &output[idx + "Ref: ".len()..];
    let token: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    (!token.is_empty()).then_some(token)
}
