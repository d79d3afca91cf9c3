//! Chat endpoint: message → router → supervisor → conversation store

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

use super::AppState;
use crate::domain::EscalationReason;
use crate::supervisor::{TurnResult, FAILURE_MESSAGE};

/// Incoming chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Chat reply
#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub session_id: String,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> impl IntoResponse {
    let route = state
        .router
        .route(&body.user_id, &body.message, body.session_id.as_deref());

    // Admission keys on the first suggestion: the agent this turn will run
    // absent planner or failover overrides.
    let admit_agent = route
        .suggested_agent_ids
        .first()
        .cloned()
        .unwrap_or_else(|| "support".to_string());

    let _permit = match state.admission.acquire(&admit_agent).await {
        Ok(permit) => permit,
        Err(e) => {
            warn!(agent = %admit_agent, error = %e, "turn rejected: agent at capacity");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "overloaded", "agent_id": admit_agent })),
            )
                .into_response();
        }
    };

    let turn = match tokio::time::timeout(
        state.request_deadline,
        state.supervisor.run_turn(
            &body.user_id,
            &body.message,
            &route.session_id,
            route.suggested_agent_ids.clone(),
        ),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            warn!(session = %route.session_id, "chat request exceeded deadline");
            // A blown deadline counts as an invocation failure for the
            // agent this turn was routed to
            if let Some(cb) = &state.circuit_breaker {
                cb.record_failure(&admit_agent);
            }
            TurnResult {
                session_id: route.session_id.clone(),
                reply: FAILURE_MESSAGE.to_string(),
                agent_id: None,
                needs_escalation: true,
                escalation_reason: EscalationReason::InvocationFailed,
            }
        }
    };

    // Long-term transcript: user turn happens-before the assistant turn
    state
        .conversation_store
        .append_turn(&turn.session_id, "user", &body.message, None)
        .await;
    let metadata = turn.agent_id.as_ref().map(|agent_id| {
        HashMap::from([("agent_id".to_string(), json!(agent_id))])
    });
    state
        .conversation_store
        .append_turn(&turn.session_id, "assistant", &turn.reply, metadata)
        .await;

    Json(ChatResponseBody {
        session_id: turn.session_id,
        reply: turn.reply,
        agent_id: turn.agent_id,
    })
    .into_response()
}
