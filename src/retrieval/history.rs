//! Conversation history formatting for agent prompts

use crate::domain::{Message, Role};

/// Format the last `n` user/assistant turns as role-prefixed lines for
/// inclusion in an agent prompt. Tool and system traffic is skipped.
pub fn format_last_n(messages: &[Message], n: usize) -> String {
    let lines: Vec<String> = messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .filter(|m| !m.content.is_empty())
        .rev()
        .take(n)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|m| {
            let prefix = if m.role == Role::User { "User:" } else { "Agent:" };
            format!("{} {}", prefix, m.content)
        })
        .collect();

    if lines.is_empty() {
        return "(No previous conversation)".to_string();
    }
    lines.join("\n")
}
