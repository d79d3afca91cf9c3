//! GraphQL conversation query API

use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Schema, SimpleObject};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use std::sync::Arc;

use crate::store::ConversationStore;

const DEFAULT_SESSIONS_LIMIT: usize = 50;

/// A single conversation turn
#[derive(Debug, SimpleObject)]
pub struct GqlTurn {
    pub role: String,
    pub content: String,
    pub metadata_json: Option<String>,
}

/// Conversation history for a session
#[derive(Debug, SimpleObject)]
pub struct Conversation {
    pub session_id: String,
    pub turns: Vec<GqlTurn>,
}

/// Session identifier (for lists)
#[derive(Debug, SimpleObject)]
pub struct SessionInfo {
    pub session_id: String,
}

/// Conversation history queries
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Conversation history for a session; null when the session is unknown
    async fn conversation(
        &self,
        ctx: &Context<'_>,
        session_id: String,
        limit: Option<usize>,
    ) -> Option<Conversation> {
        let store = ctx.data_unchecked::<Arc<dyn ConversationStore>>();
        let turns = store.get_history(&session_id, limit).await;
        if turns.is_empty() {
            return None;
        }
        Some(Conversation {
            session_id,
            turns: turns
                .into_iter()
                .map(|t| GqlTurn {
                    role: t.role,
                    content: t.content,
                    metadata_json: t
                        .metadata
                        .as_ref()
                        .and_then(|m| serde_json::to_string(m).ok()),
                })
                .collect(),
        })
    }

    /// Recent session ids
    async fn sessions(&self, ctx: &Context<'_>, limit: Option<usize>) -> Vec<SessionInfo> {
        let store = ctx.data_unchecked::<Arc<dyn ConversationStore>>();
        store
            .list_sessions(Some(limit.unwrap_or(DEFAULT_SESSIONS_LIMIT)))
            .await
            .into_iter()
            .map(|session_id| SessionInfo { session_id })
            .collect()
    }
}

pub type ConversationSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the schema with the conversation store in context
pub fn build_schema(store: Arc<dyn ConversationStore>) -> ConversationSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(store)
        .finish()
}

/// POST /graphql
pub async fn graphql(
    State(state): State<super::AppState>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    state.graphql_schema.execute(request.into_inner()).await.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryConversationStore;
    use std::collections::HashMap;

    async fn seeded_schema() -> ConversationSchema {
        let store = Arc::new(InMemoryConversationStore::new());
        store.append_turn("s1", "user", "hello", None).await;
        store
            .append_turn(
                "s1",
                "assistant",
                "hi",
                Some(HashMap::from([(
                    "agent_id".to_string(),
                    serde_json::json!("support"),
                )])),
            )
            .await;
        build_schema(store)
    }

    #[tokio::test]
    async fn conversation_query_returns_turns() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(r#"{ conversation(sessionId: "s1") { sessionId turns { role content metadataJson } } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["conversation"]["sessionId"], "s1");
        assert_eq!(data["conversation"]["turns"][0]["role"], "user");
        assert!(data["conversation"]["turns"][1]["metadataJson"]
            .as_str()
            .unwrap()
            .contains("support"));
    }

    #[tokio::test]
    async fn unknown_session_is_null() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(r#"{ conversation(sessionId: "missing") { sessionId } }"#)
            .await;
        assert!(response.errors.is_empty());
        let data = response.data.into_json().unwrap();
        assert!(data["conversation"].is_null());
    }

    #[tokio::test]
    async fn sessions_query_lists_ids() {
        let schema = seeded_schema().await;
        let response = schema.execute(r#"{ sessions { sessionId } }"#).await;
        assert!(response.errors.is_empty());
        let data = response.data.into_json().unwrap();
        assert_eq!(data["sessions"][0]["sessionId"], "s1");
    }

    #[tokio::test]
    async fn conversation_limit_returns_tail() {
        let schema = seeded_schema().await;
        let response = schema
            .execute(r#"{ conversation(sessionId: "s1", limit: 1) { turns { role } } }"#)
            .await;
        let data = response.data.into_json().unwrap();
        let turns = data["conversation"]["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["role"], "assistant");
    }
}
