//! Error types for the dispatcher

use thiserror::Error;

/// Errors that can occur while dispatching a conversation turn
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Agent not found in the registry
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// LLM backend error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Retrieval backend error
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Checkpointer / state persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Escalation handler error
    #[error("Escalation handler error: {0}")]
    Escalation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Agent invocation exceeded its deadline
    #[error("Agent invocation timed out after {0}s")]
    InvocationTimeout(u64),

    /// Too many concurrent turns for an agent
    #[error("Agent {0} is at capacity")]
    Overloaded(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors specific to LLM backend operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

/// Result type alias for dispatcher operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
