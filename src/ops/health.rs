//! Aggregate health payload for the /health endpoint

use serde::Serialize;
use std::collections::BTreeMap;

use super::circuit_breaker::{CircuitBreaker, CircuitStatus};

/// Health payload: overall status, per-agent circuit state, tool server state
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub agents: BTreeMap<String, &'static str>,
    pub mcp: &'static str,
}

impl HealthReport {
    pub fn is_degraded(&self) -> bool {
        self.status == "degraded"
    }
}

/// Build the health report from circuit states and tool server availability.
/// Any open or half-open circuit, or an unavailable tool server, degrades
/// overall status.
pub fn health_report(
    circuit_breaker: Option<&CircuitBreaker>,
    agent_ids: &[String],
    mcp_available: bool,
) -> HealthReport {
    let mut status = "ok";
    let mut agents = BTreeMap::new();

    for agent_id in agent_ids {
        let label = match circuit_breaker.map(|cb| cb.status(agent_id)) {
            Some(CircuitStatus::Open) => {
                status = "degraded";
                "circuit_open"
            }
            Some(CircuitStatus::HalfOpen) => {
                status = "degraded";
                "half_open"
            }
            _ => "healthy",
        };
        agents.insert(agent_id.clone(), label);
    }

    if !mcp_available {
        status = "degraded";
    }

    HealthReport {
        status,
        agents,
        mcp: if mcp_available { "ok" } else { "unavailable" },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn all_healthy_is_ok() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        let report = health_report(Some(&cb), &["support".into(), "billing".into()], true);
        assert_eq!(report.status, "ok");
        assert_eq!(report.agents["support"], "healthy");
        assert_eq!(report.mcp, "ok");
        assert!(!report.is_degraded());
    }

    #[test]
    fn open_circuit_degrades() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60));
        cb.record_failure("billing");
        let report = health_report(Some(&cb), &["support".into(), "billing".into()], true);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.agents["billing"], "circuit_open");
        assert_eq!(report.agents["support"], "healthy");
    }

    #[test]
    fn missing_mcp_degrades() {
        let report = health_report(None, &["support".into()], false);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.mcp, "unavailable");
        assert_eq!(report.agents["support"], "healthy");
    }
}
