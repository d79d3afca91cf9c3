//! HITL endpoints: list and clear pending escalations

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::AppState;

/// GET /hitl/pending: sessions waiting for a human
pub async fn pending(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pending.list_pending())
}

/// POST /hitl/pending/{session_id}/clear: a human picked the session up
pub async fn clear(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let cleared = state.pending.clear_pending(&session_id);
    Json(json!({ "session_id": session_id, "cleared": cleared }))
}
