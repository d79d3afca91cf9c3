//! Email-notify HITL handler. Default: log only (no SMTP transport).

use async_trait::async_trait;

use super::HitlHandler;
use crate::domain::EscalationContext;
use crate::error::DispatchResult;

/// Notify the support team of an escalation. Without a recipient the
/// notification is only logged.
pub struct EmailNotifyHitlHandler {
    email_to: Option<String>,
}

impl EmailNotifyHitlHandler {
    pub fn new(email_to: Option<String>) -> Self {
        Self { email_to }
    }
}

#[async_trait]
impl HitlHandler for EmailNotifyHitlHandler {
    async fn on_escalate(&self, ctx: &EscalationContext) -> DispatchResult<()> {
        let body = format!(
            "Escalation: session={}, user={}, reason={}\nLast user message: {}\nLast agent message: {}",
            ctx.session_id,
            ctx.user_id,
            ctx.reason,
            ctx.last_user_message.as_deref().unwrap_or("(none)"),
            ctx.last_agent_message.as_deref().unwrap_or("(none)"),
        );

        match &self.email_to {
            // Production: hand off to an email API here
            Some(to) => tracing::info!(to = %to, "HITL email notification: {}", body),
            None => tracing::info!("HITL escalation (no email configured): {}", body),
        }
        Ok(())
    }
}
