//! Health endpoint: agent circuit states and tool server availability

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::AppState;
use crate::ops::health_report;

/// GET /health. Answers 503 with the same payload when degraded.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = health_report(
        state.circuit_breaker.as_deref(),
        &state.agent_ids,
        state.mcp_available,
    );

    let status = if report.is_degraded() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(report))
}
