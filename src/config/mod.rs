//! Application configuration
//!
//! Settings are read once at startup from a TOML file, overridden by
//! `SWITCHBOARD_*` environment variables and finally by CLI flags.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Top-level application settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub agent_ops: AgentOpsSettings,
    #[serde(default)]
    pub guardrails: GuardrailSettings,
    #[serde(default)]
    pub hitl: HitlSettings,
    #[serde(default)]
    pub intent: IntentSettings,
    #[serde(default)]
    pub faithfulness: FaithfulnessSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub mcp: McpSettings,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub admission: AdmissionSettings,
}

impl Settings {
    /// Load settings from the default config file and environment
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("switchboard.toml")
    }

    /// Load settings from a specific config file and environment
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("SWITCHBOARD").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Load settings with CLI overrides applied
    pub fn new_with_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut settings = Self::from_file(&cli.config.to_string_lossy())?;

        if let Some(host) = &cli.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            settings.server.port = port;
        }
        if let Some(url) = &cli.mcp_url {
            settings.mcp.server_url = Some(url.clone());
        }

        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// End-to-end deadline for one chat request, in seconds
    #[serde(default = "default_request_deadline")]
    pub request_deadline_seconds: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_deadline_seconds: default_request_deadline(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_deadline() -> u64 {
    60
}

/// LLM backend settings (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Per-call timeout, in seconds (timed-out calls are retried once)
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            top_p: default_top_p(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_top_p() -> f32 {
    0.9
}

fn default_llm_timeout() -> u64 {
    10
}

/// Supervisor pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorSettings {
    /// Pick the agent with an LLM planning step before routing
    #[serde(default)]
    pub planning_enabled: bool,
    /// Run agents with the ReAct text protocol instead of tool calling
    #[serde(default)]
    pub react_enabled: bool,
    #[serde(default = "default_react_max_steps")]
    pub react_max_steps: u32,
    #[serde(default = "default_max_tool_iters")]
    pub max_tool_iters: u32,
    #[serde(default = "default_messages_max_len")]
    pub messages_max_len: usize,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            planning_enabled: false,
            react_enabled: false,
            react_max_steps: default_react_max_steps(),
            max_tool_iters: default_max_tool_iters(),
            messages_max_len: default_messages_max_len(),
            session_ttl_seconds: default_session_ttl(),
        }
    }
}

fn default_react_max_steps() -> u32 {
    10
}

fn default_max_tool_iters() -> u32 {
    5
}

fn default_messages_max_len() -> usize {
    20
}

fn default_session_ttl() -> u64 {
    86400
}

/// Circuit breaker and failover settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentOpsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_cooldown")]
    pub circuit_breaker_cooldown_seconds: u64,
    #[serde(default = "default_true")]
    pub failover_enabled: bool,
    #[serde(default = "default_fallback_agent")]
    pub failover_fallback_agent_id: String,
    #[serde(default = "default_invocation_timeout")]
    pub agent_invocation_timeout_seconds: u64,
}

impl Default for AgentOpsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            circuit_breaker_failure_threshold: default_failure_threshold(),
            circuit_breaker_cooldown_seconds: default_cooldown(),
            failover_enabled: true,
            failover_fallback_agent_id: default_fallback_agent(),
            agent_invocation_timeout_seconds: default_invocation_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    60
}

fn default_fallback_agent() -> String {
    "support".to_string()
}

fn default_invocation_timeout() -> u64 {
    30
}

/// Guardrail settings: input admission and output sanitization
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardrailSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_input_len")]
    pub max_input_len: usize,
    #[serde(default = "default_max_output_len")]
    pub max_output_len: usize,
    /// Input containing any of these (case-insensitive) is rejected
    #[serde(default = "default_input_block_patterns")]
    pub input_block_patterns: Vec<String>,
    /// Output occurrences of these (case-insensitive) are removed
    #[serde(default = "default_output_block_patterns")]
    pub output_block_patterns: Vec<String>,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_input_len: default_max_input_len(),
            max_output_len: default_max_output_len(),
            input_block_patterns: default_input_block_patterns(),
            output_block_patterns: default_output_block_patterns(),
        }
    }
}

fn default_max_input_len() -> usize {
    8000
}

fn default_max_output_len() -> usize {
    4000
}

fn default_input_block_patterns() -> Vec<String> {
    [
        "hack",
        "exploit",
        "ddos",
        "password crack",
        "credential steal",
        "ignore previous instructions",
        "disregard your instructions",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_output_block_patterns() -> Vec<String> {
    ["internal api key", "secret token", "admin password"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Human-in-the-loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HitlSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Handler kind: stub | ticket | email
    #[serde(default = "default_hitl_handler")]
    pub handler: String,
    #[serde(default)]
    pub email_to: String,
}

impl Default for HitlSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            handler: default_hitl_handler(),
            email_to: String::new(),
        }
    }
}

fn default_hitl_handler() -> String {
    "stub".to_string()
}

/// Intent classification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntentSettings {
    /// Use the trained classifier instead of keyword matching
    #[serde(default)]
    pub use_model: bool,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for IntentSettings {
    fn default() -> Self {
        Self {
            use_model: false,
            model_path: None,
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.7
}

/// Faithfulness scoring settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaithfulnessSettings {
    /// Use the trained scorer instead of the null scorer
    #[serde(default)]
    pub use_model: bool,
    #[serde(default)]
    pub model_path: Option<String>,
    /// Replies scoring strictly below this escalate to a human
    #[serde(default = "default_faithfulness_threshold")]
    pub threshold: f32,
}

impl Default for FaithfulnessSettings {
    fn default() -> Self {
        Self {
            use_model: false,
            model_path: None,
            threshold: default_faithfulness_threshold(),
        }
    }
}

fn default_faithfulness_threshold() -> f32 {
    0.8
}

/// Vector retrieval settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetrievalSettings {
    /// Vector backend URL; stub retrieval when unset
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// External tool server (MCP) settings. The tool server is a required
/// collaborator: startup fails when it cannot be reached.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpSettings {
    /// Tool server URL
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_mcp_timeout")]
    pub timeout_seconds: u64,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            timeout_seconds: default_mcp_timeout(),
        }
    }
}

fn default_mcp_timeout() -> u64 {
    30
}

/// Global request rate limiting
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Per-agent concurrency bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdmissionSettings {
    /// Concurrent in-flight turns per agent
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Turns allowed to wait when all slots are busy
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_max_concurrent() -> usize {
    64
}

fn default_queue_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.faithfulness.threshold, 0.8);
        assert_eq!(settings.intent.confidence_threshold, 0.7);
        assert_eq!(settings.supervisor.react_max_steps, 10);
        assert_eq!(settings.supervisor.max_tool_iters, 5);
        assert_eq!(settings.supervisor.messages_max_len, 20);
        assert_eq!(settings.supervisor.session_ttl_seconds, 86400);
        assert_eq!(settings.agent_ops.circuit_breaker_failure_threshold, 3);
        assert_eq!(settings.agent_ops.circuit_breaker_cooldown_seconds, 60);
        assert_eq!(settings.agent_ops.failover_fallback_agent_id, "support");
        assert_eq!(settings.agent_ops.agent_invocation_timeout_seconds, 30);
        assert_eq!(settings.guardrails.max_input_len, 8000);
        assert_eq!(settings.guardrails.max_output_len, 4000);
        assert_eq!(settings.llm.top_p, 0.9);
        assert_eq!(settings.server.request_deadline_seconds, 60);
    }

    #[test]
    fn partial_config_keeps_section_defaults() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "supervisor": { "planning_enabled": true, "max_tool_iters": 3 },
            "hitl": { "handler": "ticket" }
        }))
        .unwrap();
        assert!(settings.supervisor.planning_enabled);
        assert_eq!(settings.supervisor.max_tool_iters, 3);
        assert_eq!(settings.hitl.handler, "ticket");
        assert_eq!(settings.faithfulness.threshold, 0.8);
        assert!(settings.hitl.enabled);
    }
}
