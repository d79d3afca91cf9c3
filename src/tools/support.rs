//! Support agent tools: knowledge base search, ticket creation

use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{required_str, FnTool, Tool};

/// Tools for the support agent
pub fn support_tools() -> Vec<Arc<dyn Tool>> {
    vec![search_knowledge_base(), create_support_ticket()]
}

fn search_knowledge_base() -> Arc<dyn Tool> {
    FnTool::new(
        "search_knowledge_base",
        "Search the support knowledge base for FAQs and help articles. Use when the user asks about products, policies, or how-to questions.",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        }),
        |args| {
            let query = required_str(&args, "query")?;
            // Stub: production would call the real KB
            Ok(format!(
                "[Stub KB] Found 2 articles for '{}': (1) Getting started guide, (2) Common troubleshooting. Suggest checking the docs or escalating if needed.",
                query
            ))
        },
    )
}

fn create_support_ticket() -> Arc<dyn Tool> {
    FnTool::new(
        "create_support_ticket",
        "Create a support ticket for human follow-up. Use when the user needs escalation or the issue cannot be resolved by the bot.",
        json!({
            "type": "object",
            "properties": {
                "subject": { "type": "string" },
                "description": { "type": "string" },
                "priority": { "type": "string", "enum": ["low", "normal", "high"] }
            },
            "required": ["subject", "description"]
        }),
        |args| {
            let subject = required_str(&args, "subject")?;
            let description = required_str(&args, "description")?;
            let priority = args
                .get("priority")
                .and_then(|v| v.as_str())
                .unwrap_or("normal");
            let mut hasher = DefaultHasher::new();
            description.hash(&mut hasher);
            // Stub: production would call the ticketing API
            Ok(format!(
                "[Stub] Ticket created: subject='{}', priority={}. Ref: TKT-{}. A human agent will follow up within 24 hours.",
                subject,
                priority,
                hasher.finish() % 100_000
            ))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kb_search_mentions_query() {
        let tool = search_knowledge_base();
        let out = tool.call(json!({"query": "reset password"})).await.unwrap();
        assert!(out.contains("reset password"));
    }

    #[tokio::test]
    async fn ticket_ref_is_stable_per_description() {
        let tool = create_support_ticket();
        let args = json!({"subject": "s", "description": "d"});
        let a = tool.call(args.clone()).await.unwrap();
        let b = tool.call(args).await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains("TKT-"));
        assert!(a.contains("priority=normal"));
    }

    #[tokio::test]
    async fn ticket_requires_subject() {
        let tool = create_support_ticket();
        assert!(tool.call(json!({"description": "d"})).await.is_err());
    }
}
