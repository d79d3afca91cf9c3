//! Human-in-the-loop escalation handling
//!
//! When the supervisor takes the escalate branch it hands an
//! [`EscalationContext`] to the configured handler. Handler failures are
//! logged by the caller and never abort the turn.

mod email;
mod ticket;

pub use email::EmailNotifyHitlHandler;
pub use ticket::{PendingEscalation, PendingEscalations, TicketHitlHandler};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::HitlSettings;
use crate::domain::EscalationContext;
use crate::error::DispatchResult;
use crate::tools::Tool;

/// Interface: when the supervisor escalates, perform an action
/// (create a ticket, notify operators, nothing).
#[async_trait]
pub trait HitlHandler: Send + Sync {
    async fn on_escalate(&self, ctx: &EscalationContext) -> DispatchResult<()>;
}

/// No-op handler
#[derive(Debug, Default)]
pub struct StubHitlHandler;

#[async_trait]
impl HitlHandler for StubHitlHandler {
    async fn on_escalate(&self, _ctx: &EscalationContext) -> DispatchResult<()> {
        Ok(())
    }
}

/// Build the configured handler. `pending` is the process-wide escalation
/// queue surfaced through the HITL endpoints; `ticket_tool` is the
/// registered ticket-creation tool.
pub fn create_handler(
    settings: &HitlSettings,
    pending: PendingEscalations,
    ticket_tool: Arc<dyn Tool>,
) -> Arc<dyn HitlHandler> {
    if !settings.enabled {
        return Arc::new(StubHitlHandler);
    }

    match settings.handler.trim().to_lowercase().as_str() {
        "ticket" => Arc::new(TicketHitlHandler::new(pending, ticket_tool)),
        "email" => Arc::new(EmailNotifyHitlHandler::new(if settings.email_to.is_empty() {
            None
        } else {
            Some(settings.email_to.clone())
        })),
        _ => Arc::new(StubHitlHandler),
    }
}
