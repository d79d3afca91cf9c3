//! Intent classification for the session router

use serde::Deserialize;
use std::path::Path;

/// Intent labels in fixed order (support = default index 0)
pub const INTENT_LABELS: [&str; 4] = ["support", "billing", "tech", "escalation"];

/// Keyword table: any keyword substring match suggests the agent
const INTENT_MAP: [(&[&str], &str); 3] = [
    (
        &["invoice", "bill", "payment", "refund", "billing"],
        "billing",
    ),
    (&["tech", "error", "bug", "install", "troubleshoot"], "tech"),
    (
        &["human", "agent", "escalate", "speak to someone"],
        "escalation",
    ),
];

/// Trait for intent classification. Returns suggested agent ids, ordered.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, message: &str) -> Vec<String>;
}

/// Keyword-based intent classifier
#[derive(Debug, Default)]
pub struct KeywordIntentClassifier;

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, message: &str) -> Vec<String> {
        let lower = message.to_lowercase();
        let mut suggested: Vec<String> = Vec::new();
        for (keywords, agent_id) in INTENT_MAP {
            if keywords.iter().any(|kw| lower.contains(kw)) {
                suggested.push(agent_id.to_string());
            }
        }
        if suggested.is_empty() {
            suggested.push("support".to_string());
        }
        suggested
    }
}

/// Trained single-label classifier over the fixed intent labels.
///
/// A small softmax model over hashed token counts, loaded from a JSON
/// weights file. Returns the best label when its confidence is at least
/// 0.5, otherwise `["support"]`. Any load or inference failure falls back
/// to the keyword classifier.
pub struct ModelIntentClassifier {
    model: Option<IntentModel>,
    fallback: KeywordIntentClassifier,
}

#[derive(Debug, Deserialize)]
struct IntentModel {
    /// Feature dimension for the hashed bag of tokens
    dim: usize,
    /// Per-label bias, one entry per intent label
    bias: Vec<f32>,
    /// Per-label weight row over the hashed features
    weights: Vec<Vec<f32>>,
}

impl IntentModel {
    fn validate(&self) -> bool {
        self.dim > 0
            && self.bias.len() == INTENT_LABELS.len()
            && self.weights.len() == INTENT_LABELS.len()
            && self.weights.iter().all(|row| row.len() == self.dim)
    }

    fn predict(&self, message: &str) -> (usize, f32) {
        let features = hashed_features(message, self.dim);
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(&features).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        // Softmax, stabilized by the max logit
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum();

        let (idx, best) = exps
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, e)| (i, *e))
            .unwrap_or((0, 1.0));

        (idx, if sum > 0.0 { best / sum } else { 0.0 })
    }
}

impl ModelIntentClassifier {
    /// Load the model from `model_path`; missing or invalid weights leave
    /// the classifier in keyword-fallback mode.
    pub fn new(model_path: Option<&str>) -> Self {
        let model = model_path.and_then(|path| match load_model(path) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(path, error = %e, "intent model unavailable, using keyword fallback");
                None
            }
        });

        Self {
            model,
            fallback: KeywordIntentClassifier,
        }
    }
}

fn load_model(path: &str) -> Result<IntentModel, String> {
    let raw = std::fs::read_to_string(Path::new(path)).map_err(|e| e.to_string())?;
    let model: IntentModel = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    if !model.validate() {
        return Err("weight shapes do not match intent labels".to_string());
    }
    Ok(model)
}

impl IntentClassifier for ModelIntentClassifier {
    fn classify(&self, message: &str) -> Vec<String> {
        let Some(model) = &self.model else {
            return self.fallback.classify(message);
        };

        let msg = message.trim();
        let msg = if msg.is_empty() { "help" } else { msg };

        let (idx, confidence) = model.predict(msg);
        if confidence < 0.5 {
            return vec!["support".to_string()];
        }
        vec![INTENT_LABELS[idx].to_string()]
    }
}

/// Hash lowercase whitespace tokens into a fixed-size count vector
fn hashed_features(text: &str, dim: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut features = vec![0.0f32; dim];
    for token in text.to_lowercase().split_whitespace() {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        features[(hasher.finish() as usize) % dim] += 1.0;
    }
    features
}
