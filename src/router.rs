//! Session router: accept or mint a session id, suggest agent pools

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::IntentSettings;
use crate::intent::{IntentClassifier, KeywordIntentClassifier, ModelIntentClassifier};

/// Output of the session router
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub session_id: String,
    /// Ordered agent suggestions from the intent classifier
    pub suggested_agent_ids: Vec<String>,
    /// Cache key for the message embedding
    pub embedding_cache_key: String,
}

/// Routes a user message to suggested agent pools via intent classification
pub struct SessionRouter {
    classifier: Arc<dyn IntentClassifier>,
}

impl SessionRouter {
    pub fn new(settings: &IntentSettings) -> Self {
        let classifier: Arc<dyn IntentClassifier> = if settings.use_model {
            Arc::new(ModelIntentClassifier::new(settings.model_path.as_deref()))
        } else {
            Arc::new(KeywordIntentClassifier)
        };
        Self { classifier }
    }

    pub fn with_classifier(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// Classify intent and return the session id plus ordered suggestions.
    /// A missing session id is replaced with a fresh random token.
    pub fn route(&self, _user_id: &str, message: &str, session_id: Option<&str>) -> RouteOutcome {
        let session_id = match session_id {
            Some(sid) if !sid.is_empty() => sid.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let suggested = self.classifier.classify(message);

        let mut hasher = DefaultHasher::new();
        message.hash(&mut hasher);
        let embedding_cache_key = format!("emb_{}", hasher.finish() % 100_000_000);

        RouteOutcome {
            session_id,
            suggested_agent_ids: suggested,
            embedding_cache_key,
        }
    }
}
