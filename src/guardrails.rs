//! Guardrails: input admission and output sanitization

use crate::config::GuardrailSettings;

const REMOVED_PLACEHOLDER: &str = "[content removed]";
const TRUNCATION_MARKER: &str = "\n[...truncated]";

/// Result of a guardrail check
#[derive(Debug, Clone)]
pub struct GuardrailVerdict {
    pub passed: bool,
    pub filtered_text: String,
    pub reason: Option<String>,
}

impl GuardrailVerdict {
    fn pass(text: impl Into<String>) -> Self {
        Self {
            passed: true,
            filtered_text: text.into(),
            reason: None,
        }
    }

    fn reject(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            filtered_text: text.into(),
            reason: Some(reason.into()),
        }
    }
}

/// Keyword guardrails: block policy-violating input, scrub agent output
pub struct Guardrails {
    settings: GuardrailSettings,
}

impl Guardrails {
    pub fn new(settings: GuardrailSettings) -> Self {
        Self { settings }
    }

    /// Check user input. Rejects empty text, blocklisted substrings and
    /// oversized messages. Disabled guardrails still reject nothing.
    pub fn guard_input(&self, text: &str) -> GuardrailVerdict {
        if !self.settings.enabled {
            return GuardrailVerdict::pass(text);
        }

        if text.trim().is_empty() {
            return GuardrailVerdict::reject("", "empty");
        }

        let lower = text.to_lowercase();
        for pattern in &self.settings.input_block_patterns {
            if lower.contains(&pattern.to_lowercase()) {
                return GuardrailVerdict::reject(text, format!("input_blocked:{}", pattern));
            }
        }

        if text.chars().count() > self.settings.max_input_len {
            return GuardrailVerdict::reject(text, "input_too_long");
        }

        GuardrailVerdict::pass(text)
    }

    /// Filter agent output. Never rejects: sensitive substrings are replaced
    /// until none remain, then the text is truncated to the output limit.
    pub fn guard_output(&self, text: &str) -> GuardrailVerdict {
        if text.is_empty() {
            return GuardrailVerdict::pass("");
        }

        let mut filtered = text.to_string();
        for pattern in &self.settings.output_block_patterns {
            let needle = pattern.to_lowercase();
            if needle.is_empty() {
                continue;
            }
            loop {
                let lower = filtered.to_lowercase();
                let Some(idx) = lower.find(&needle) else {
                    break;
                };
                filtered.replace_range(idx..idx + needle.len(), REMOVED_PLACEHOLDER);
            }
        }

        let max_len = self.settings.max_output_len;
        if filtered.chars().count() > max_len {
            filtered = filtered.chars().take(max_len).collect::<String>() + TRUNCATION_MARKER;
        }

        GuardrailVerdict::pass(filtered)
    }
}
