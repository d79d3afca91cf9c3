//! HTTP and GraphQL adapters
//!
//! Thin frontends over the dispatcher core: chat, health, HITL queue and
//! conversation queries. All handlers share [`AppState`].

mod admission;
mod chat_handler;
mod graphql_handler;
mod health_handler;
mod hitl_handler;
pub mod rate_limit;


pub use admission::{AdmissionControl, AdmissionPermit};
pub use chat_handler::{chat, ChatRequestBody, ChatResponseBody};
pub use graphql_handler::{build_schema, graphql, ConversationSchema};
pub use health_handler::health;
pub use hitl_handler::{clear, pending};

use std::sync::Arc;
use std::time::Duration;

use crate::hitl::PendingEscalations;
use crate::ops::CircuitBreaker;
use crate::router::SessionRouter;
use crate::store::ConversationStore;
use crate::supervisor::Supervisor;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<SessionRouter>,
    pub supervisor: Arc<Supervisor>,
    pub conversation_store: Arc<dyn ConversationStore>,
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
    /// Runnable agent ids, for health reporting
    pub agent_ids: Vec<String>,
    pub pending: PendingEscalations,
    pub admission: Arc<AdmissionControl>,
    pub graphql_schema: ConversationSchema,
    /// Whether the external tool server answered at startup
    pub mcp_available: bool,
    /// End-to-end deadline for one chat request
    pub request_deadline: Duration,
}
