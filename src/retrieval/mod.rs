//! Document retrieval against an external vector store

mod history;

pub use history::format_last_n;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::RetrievalSettings;
use crate::error::{DispatchError, DispatchResult};

/// A retrieved document chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
}

/// Trait for retrieval backends
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Value>,
    ) -> DispatchResult<Vec<RetrievedChunk>>;
}

/// Join chunk contents into the context string handed to the LLM
pub fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stub retriever: deterministic chunk echoing the query
#[derive(Debug, Default)]
pub struct StubRetriever;

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        _filters: Option<&Value>,
    ) -> DispatchResult<Vec<RetrievedChunk>> {
        let preview: String = query.chars().take(50).collect();
        let chunks = vec![RetrievedChunk {
            content: format!("Stub context for: {}...", preview),
            source: Some("stub_doc_1".to_string()),
            score: Some(0.95),
        }];
        Ok(chunks.into_iter().take(top_k).collect())
    }
}

/// Retriever backed by an external vector store over HTTP
pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRetriever {
    pub fn new(settings: &RetrievalSettings) -> DispatchResult<Self> {
        let base_url = settings
            .backend_url
            .clone()
            .ok_or_else(|| DispatchError::Configuration("retrieval.backend_url not set".into()))?;

        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Value>,
    ) -> DispatchResult<Vec<RetrievedChunk>> {
        let mut body = json!({ "query": query, "top_k": top_k });
        if let Some(filters) = filters {
            body["filters"] = filters.clone();
        }

        let mut req = self.client.post(format!("{}/retrieve", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| DispatchError::Retrieval(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError::Retrieval(format!(
                "vector backend returned {}",
                response.status()
            )));
        }

        response
            .json::<Vec<RetrievedChunk>>()
            .await
            .map_err(|e| DispatchError::Retrieval(e.to_string()))
    }
}

/// Create the configured retriever
pub fn create_retriever(settings: &RetrievalSettings) -> DispatchResult<Arc<dyn Retriever>> {
    if settings.backend_url.is_some() {
        Ok(Arc::new(HttpRetriever::new(settings)?))
    } else {
        Ok(Arc::new(StubRetriever))
    }
}
