//! Per-agent circuit breaker
//!
//! After `failure_threshold` consecutive failures an agent's circuit opens
//! and route-time filtering skips it until the cooldown expires (then
//! half-open: one success closes it, one failure re-opens). State is driven
//! only by invocation outcomes; there is no background probing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit state: closed = normal, open = failing, half-open = probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitStatus::Closed => write!(f, "closed"),
            CircuitStatus::Open => write!(f, "open"),
            CircuitStatus::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Per-agent circuit record
#[derive(Debug, Clone)]
struct AgentCircuit {
    status: CircuitStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for AgentCircuit {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Point-in-time view of one agent's circuit, for health reporting
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
}

/// Per-agent circuit breaker map. Circuits are created lazily on first
/// reference; all transitions happen under one mutex so concurrent
/// route reads and invoke updates observe consistent state.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    circuits: Mutex<HashMap<String, AgentCircuit>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown: cooldown.max(Duration::from_secs(1)),
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// True when the agent may be invoked (closed or half-open). An open
    /// circuit whose cooldown has elapsed transitions to half-open here.
    pub fn is_available(&self, agent_id: &str) -> bool {
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits.entry(agent_id.to_string()).or_default();
        Self::maybe_half_open(agent_id, circuit, self.cooldown);
        matches!(circuit.status, CircuitStatus::Closed | CircuitStatus::HalfOpen)
    }

    /// Record a successful invocation: resets the failure count and closes
    /// a half-open circuit.
    pub fn record_success(&self, agent_id: &str) {
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits.entry(agent_id.to_string()).or_default();
        if circuit.status != CircuitStatus::Closed {
            info!(agent = agent_id, "circuit closed");
        }
        circuit.status = CircuitStatus::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
    }

    /// Record a failed invocation: increments the failure count and may
    /// open the circuit. A half-open failure re-opens immediately.
    pub fn record_failure(&self, agent_id: &str) {
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits.entry(agent_id.to_string()).or_default();

        match circuit.status {
            CircuitStatus::HalfOpen => {
                warn!(agent = agent_id, "failure while half-open, circuit re-opened");
                circuit.status = CircuitStatus::Open;
                circuit.consecutive_failures = self.failure_threshold;
                circuit.opened_at = Some(Instant::now());
            }
            CircuitStatus::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.failure_threshold {
                    warn!(
                        agent = agent_id,
                        failures = circuit.consecutive_failures,
                        "circuit opened"
                    );
                    circuit.status = CircuitStatus::Open;
                    circuit.opened_at = Some(Instant::now());
                }
            }
            CircuitStatus::Open => {
                circuit.consecutive_failures += 1;
            }
        }
    }

    /// Current status (applies the lazy open → half-open transition)
    pub fn status(&self, agent_id: &str) -> CircuitStatus {
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits.entry(agent_id.to_string()).or_default();
        Self::maybe_half_open(agent_id, circuit, self.cooldown);
        circuit.status
    }

    /// Snapshot for health reporting
    pub fn snapshot(&self, agent_id: &str) -> CircuitSnapshot {
        let mut circuits = self.circuits.lock().unwrap();
        let circuit = circuits.entry(agent_id.to_string()).or_default();
        Self::maybe_half_open(agent_id, circuit, self.cooldown);
        CircuitSnapshot {
            status: circuit.status,
            consecutive_failures: circuit.consecutive_failures,
        }
    }

    /// All agent ids that have a circuit
    pub fn agent_ids(&self) -> Vec<String> {
        let circuits = self.circuits.lock().unwrap();
        let mut ids: Vec<String> = circuits.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn maybe_half_open(agent_id: &str, circuit: &mut AgentCircuit, cooldown: Duration) {
        if circuit.status != CircuitStatus::Open {
            return;
        }
        let elapsed = circuit
            .opened_at
            .map(|at| at.elapsed() >= cooldown)
            .unwrap_or(true);
        if elapsed {
            info!(agent = agent_id, "circuit half-open after cooldown");
            circuit.status = CircuitStatus::HalfOpen;
            circuit.consecutive_failures = 0;
        }
    }
}
