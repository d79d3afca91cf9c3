//! Faithfulness scoring: how grounded is a reply in the retrieved context

use serde::Deserialize;
use std::path::Path;

/// Trait for scoring a response against its retrieval context, in [0, 1].
/// Higher means more grounded.
pub trait FaithfulnessScorer: Send + Sync {
    fn score(&self, response: &str, context: &str) -> f32;
}

/// Always returns 1.0 (the gate never escalates)
#[derive(Debug, Default)]
pub struct NullScorer;

impl FaithfulnessScorer for NullScorer {
    fn score(&self, _response: &str, _context: &str) -> f32 {
        1.0
    }
}

/// Trained scorer: a logistic model over hashed token features of the
/// formatted `[RESPONSE] … [CONTEXT] …` input, loaded from a JSON weights
/// file. Load or shape failures silently degrade to the null scorer.
pub struct LinearFaithfulnessScorer {
    model: Option<FaithfulnessModel>,
    fallback: NullScorer,
}

#[derive(Debug, Deserialize)]
struct FaithfulnessModel {
    dim: usize,
    bias: f32,
    weights: Vec<f32>,
}

impl FaithfulnessModel {
    fn validate(&self) -> bool {
        self.dim > 0 && self.weights.len() == self.dim
    }

    fn predict(&self, input: &str) -> f32 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut z = self.bias;
        for token in input.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            z += self.weights[(hasher.finish() as usize) % self.dim];
        }
        sigmoid(z)
    }
}

impl LinearFaithfulnessScorer {
    pub fn new(model_path: Option<&str>) -> Self {
        let model = model_path.and_then(|path| match load_model(path) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(path, error = %e, "faithfulness model unavailable, scoring disabled");
                None
            }
        });

        Self {
            model,
            fallback: NullScorer,
        }
    }

    /// Single string input for the model: capped response then context
    fn format_input(response: &str, context: &str) -> String {
        let r: String = response.trim().chars().take(500).collect();
        let c: String = context.trim().chars().take(500).collect();
        format!("[RESPONSE] {} [CONTEXT] {}", r, c)
    }
}

impl FaithfulnessScorer for LinearFaithfulnessScorer {
    fn score(&self, response: &str, context: &str) -> f32 {
        let Some(model) = &self.model else {
            return self.fallback.score(response, context);
        };
        model.predict(&Self::format_input(response, context))
    }
}

fn load_model(path: &str) -> Result<FaithfulnessModel, String> {
    let raw = std::fs::read_to_string(Path::new(path)).map_err(|e| e.to_string())?;
    let model: FaithfulnessModel = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    if !model.validate() {
        return Err("weight shape does not match feature dimension".to_string());
    }
    Ok(model)
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}
