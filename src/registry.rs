//! Agent registry: metadata plus constructed agents

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;

/// Agent pool metadata
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub agent_id: String,
    pub capabilities: Vec<String>,
    pub model_id: String,
    pub max_concurrent: usize,
}

impl AgentProfile {
    pub fn new(agent_id: &str, capabilities: &[&str], model_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            model_id: model_id.to_string(),
            max_concurrent: 500,
        }
    }
}

/// Registry mapping agent ids to profiles and runnable agents.
/// Built once at startup; immutable afterwards.
#[derive(Default)]
pub struct AgentRegistry {
    profiles: HashMap<String, AgentProfile>,
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&mut self, profile: AgentProfile) {
        self.profiles.insert(profile.agent_id.clone(), profile);
    }

    pub fn add_agent(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    /// Runnable agent by id
    pub fn get(&self, agent_id: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.get(agent_id)
    }

    /// Whether a runnable agent is registered under this id
    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn profile(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.profiles.get(agent_id)
    }

    /// Ids of runnable agents, sorted for stable reporting
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Profiles supporting any of the given capabilities
    pub fn agents_by_capability(&self, capabilities: &[&str]) -> Vec<&AgentProfile> {
        let wanted: Vec<String> = capabilities.iter().map(|c| c.to_lowercase()).collect();
        let mut found: Vec<&AgentProfile> = self
            .profiles
            .values()
            .filter(|p| {
                p.capabilities
                    .iter()
                    .any(|c| wanted.contains(&c.to_lowercase()))
            })
            .collect();
        found.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        found
    }
}
