//! Decision events and the hook that receives them

use crate::config::schema::PolicyMode;
use std::net::IpAddr;

/// What the decision engine did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// Rejected by the global policy; the route stage never ran
    BlockedByGlobal,
    /// Rejected by the route policy
    BlockedByRoute,
    /// Passed the route policy
    Allowed,
    /// The route declares a policy that is not configured
    PolicyNotFound,
    /// The route declares no policy
    Bypass,
    /// The route policy is disabled
    PolicyDisabled,
}

/// One observable decision, borrowed from the evaluation that produced it
#[derive(Debug, Clone, Copy)]
pub struct DecisionEvent<'a> {
    pub kind: DecisionKind,
    /// `None` when the host could not determine the caller's address
    pub source: Option<IpAddr>,
    pub route: &'a str,
    pub policy: Option<&'a str>,
    pub mode: Option<PolicyMode>,
}

/// Receives every decision event. Must not influence the verdict.
pub trait DecisionObserver: Send + Sync {
    fn on_decision(&self, event: &DecisionEvent<'_>);
}

/// Emits each decision as a structured `tracing` record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DecisionObserver for TracingObserver {
    fn on_decision(&self, event: &DecisionEvent<'_>) {
        let source = event
            .source
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let policy = event.policy.unwrap_or("");
        let mode = event.mode.map(|m| m.to_string()).unwrap_or_default();
        let route = event.route;

        match event.kind {
            DecisionKind::BlockedByGlobal => {
                tracing::warn!(%source, route, policy, %mode, "Request blocked by global policy")
            }
            DecisionKind::BlockedByRoute => {
                tracing::warn!(%source, route, policy, %mode, "Request blocked by route policy")
            }
            DecisionKind::Allowed => {
                tracing::info!(%source, route, policy, %mode, "Request allowed")
            }
            DecisionKind::PolicyNotFound => {
                tracing::error!(%source, route, policy, "Could not find IP filter policy")
            }
            DecisionKind::Bypass => {
                tracing::debug!(%source, route, "No IP filter policy on route, bypassing")
            }
            DecisionKind::PolicyDisabled => {
                tracing::info!(%source, route, policy, "IP filter policy is disabled")
            }
        }
    }
}
