//! # Switchboard - Multi-Agent Conversation Dispatcher
//!
//! Switchboard routes customer-support chat traffic to a small set of
//! specialized agents. Each turn runs through a supervisor state machine
//! (plan → route → invoke → aggregate → escalate) with per-session
//! checkpointed state, a per-agent circuit breaker with failover, a
//! faithfulness gate over retrieved context, and human-in-the-loop
//! escalation with a pending queue.
//!
//! ## Architecture
//!
//! - **domain**: messages, tool calls, supervisor state
//! - **llm / retrieval / tools**: external collaborators behind traits
//! - **supervisor**: the per-turn state machine and checkpointer
//! - **ops**: circuit breaker and health aggregation
//! - **adapters**: HTTP/GraphQL frontends over the core

pub mod adapters;
pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod faithfulness;
pub mod guardrails;
pub mod hitl;
pub mod intent;
pub mod llm;
pub mod ops;
pub mod registry;
pub mod retrieval;
pub mod router;
pub mod store;
pub mod supervisor;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;

use crate::adapters::AppState;
use crate::config::RateLimitConfig;

/// Assemble the Axum application router over the shared state.
pub fn create_app(state: AppState, rate_limit: Option<&RateLimitConfig>) -> Router {
    let mut router = Router::new()
        .route("/chat", post(adapters::chat))
        .route("/health", get(adapters::health))
        .route("/hitl/pending", get(adapters::pending))
        .route("/hitl/pending/:session_id/clear", post(adapters::clear))
        .route("/graphql", post(adapters::graphql))
        .with_state(state);

    if let Some(rate_limit) = rate_limit {
        if rate_limit.enabled {
            let limiter = adapters::rate_limit::create_limiter(rate_limit);
            router = router.layer(axum::middleware::from_fn_with_state(
                limiter,
                adapters::rate_limit::rate_limit_middleware,
            ));
        }
    }

    router.layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}
