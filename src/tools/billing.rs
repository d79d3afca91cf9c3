//! Billing agent tools: invoice lookup, refund status, refund requests

use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{required_str, FnTool, Tool};

/// Tools for the billing agent
pub fn billing_tools() -> Vec<Arc<dyn Tool>> {
    vec![look_up_invoice(), get_refund_status(), create_refund_request()]
}

fn look_up_invoice() -> Arc<dyn Tool> {
    FnTool::new(
        "look_up_invoice",
        "Look up an invoice by ID. Use when the user asks about a specific invoice, payment status, or invoice details.",
        json!({
            "type": "object",
            "properties": {
                "invoice_id": { "type": "string" }
            },
            "required": ["invoice_id"]
        }),
        |args| {
            let invoice_id = required_str(&args, "invoice_id")?;
            // Stub: production would call the billing API
            Ok(format!(
                "[Stub] Invoice {}: status=paid, amount=$150.00, due_date=2025-01-15. Contact billing team for disputes.",
                invoice_id
            ))
        },
    )
}

fn get_refund_status() -> Arc<dyn Tool> {
    FnTool::new(
        "get_refund_status",
        "Get the status of a refund request. Use when the user asks about an existing refund.",
        json!({
            "type": "object",
            "properties": {
                "refund_id": { "type": "string" }
            },
            "required": ["refund_id"]
        }),
        |args| {
            let refund_id = required_str(&args, "refund_id")?;
            Ok(format!(
                "[Stub] Refund {}: status=processing, expected 5-7 business days. Contact billing@example.com for details.",
                refund_id
            ))
        },
    )
}

fn create_refund_request() -> Arc<dyn Tool> {
    FnTool::new(
        "create_refund_request",
        "Create a refund request for an order. Use when the user wants to request a refund. Amount is optional (full refund if omitted).",
        json!({
            "type": "object",
            "properties": {
                "order_id": { "type": "string" },
                "reason": { "type": "string" },
                "amount_cents": { "type": "integer" }
            },
            "required": ["order_id", "reason"]
        }),
        |args| {
            let order_id = required_str(&args, "order_id")?;
            let reason = required_str(&args, "reason")?;
            let amount = args
                .get("amount_cents")
                .and_then(|v| v.as_u64())
                .map(|cents| format!("${:.2}", cents as f64 / 100.0))
                .unwrap_or_else(|| "full".to_string());
            let mut hasher = DefaultHasher::new();
            order_id.hash(&mut hasher);
            Ok(format!(
                "[Stub] Refund request created for order {}, {} refund. Reason: {}. Ref: REF-{}. Processing within 3-5 business days.",
                order_id,
                amount,
                reason,
                hasher.finish() % 100_000
            ))
        },
    )
}
