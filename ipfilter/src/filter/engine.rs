//! Per-request decision: global policy first, then the route policy

use super::observer::{DecisionEvent, DecisionKind, DecisionObserver, TracingObserver};
use super::policy::Policy;
use super::store::{PolicyProvider, PolicyStore};
use crate::config::schema::{policy_name_from_metadata, PolicyMode};
use crate::error::{FilterError, Result};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Outcome of a filtering decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the request to the next stage of the pipeline
    Continue,
    /// Refuse the request (403)
    Reject,
}

impl Verdict {
    pub fn is_continue(&self) -> bool {
        matches!(self, Verdict::Continue)
    }

    /// HTTP status the host should answer with, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Verdict::Continue => None,
            Verdict::Reject => Some(403),
        }
    }
}

/// What the host knows about a request
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Caller address; `None` if the host could not determine it
    pub source: Option<IpAddr>,
    pub route: &'a str,
    /// Policy declared on the route, if any
    pub policy_name: Option<&'a str>,
}

impl<'a> Request<'a> {
    pub fn new(source: Option<IpAddr>, route: &'a str, policy_name: Option<&'a str>) -> Self {
        Self {
            source,
            route,
            policy_name,
        }
    }

    /// Take the policy name from route metadata
    pub fn from_metadata(
        source: Option<IpAddr>,
        route: &'a str,
        metadata: &'a HashMap<String, String>,
    ) -> Self {
        Self::new(source, route, policy_name_from_metadata(metadata))
    }
}

/// Decides ALLOW or BLOCK for each request
///
/// Evaluation is synchronous and lock-free apart from taking one snapshot
/// of the policy table, which both stages then share.
pub struct DecisionEngine {
    store: Arc<PolicyStore>,
    observer: Arc<dyn DecisionObserver>,
}

impl DecisionEngine {
    /// Engine reporting decisions through `tracing`
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self::with_observer(store, Arc::new(TracingObserver))
    }

    pub fn with_observer(store: Arc<PolicyStore>, observer: Arc<dyn DecisionObserver>) -> Self {
        Self { store, observer }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Evaluate a request against the policies currently in force
    ///
    /// A filtering denial is `Ok(Verdict::Reject)`. A route naming a policy
    /// that does not exist is `Err(FilterError::PolicyNotFound)`, which the
    /// host should answer with a server error.
    pub fn evaluate(&self, request: &Request<'_>) -> Result<Verdict> {
        let table = self.store.snapshot();
        self.evaluate_with(&*table, request)
    }

    /// Evaluate a request against an explicit set of policies
    ///
    /// Both stages read from `provider`, so it should be a single table
    /// rather than something that can change between lookups.
    pub fn evaluate_with<P>(&self, provider: &P, request: &Request<'_>) -> Result<Verdict>
    where
        P: PolicyProvider + ?Sized,
    {
        let source = request.source.map(normalize);

        if let Some(global) = provider.global_policy() {
            if !passes(&global, source) {
                self.emit(
                    DecisionKind::BlockedByGlobal,
                    source,
                    request.route,
                    Some(global.as_ref()),
                );
                return Ok(Verdict::Reject);
            }
        }

        let policy_name = match request.policy_name {
            Some(name) if !name.is_empty() => name,
            _ => {
                self.emit(DecisionKind::Bypass, source, request.route, None);
                return Ok(Verdict::Continue);
            }
        };

        let policy = match provider.policy(policy_name) {
            Some(policy) => policy,
            None => {
                self.observer.on_decision(&DecisionEvent {
                    kind: DecisionKind::PolicyNotFound,
                    source,
                    route: request.route,
                    policy: Some(policy_name),
                    mode: None,
                });
                return Err(FilterError::PolicyNotFound {
                    policy: policy_name.to_string(),
                    route: request.route.to_string(),
                });
            }
        };

        if policy.mode() == PolicyMode::Disabled {
            self.emit(
                DecisionKind::PolicyDisabled,
                source,
                request.route,
                Some(policy.as_ref()),
            );
            return Ok(Verdict::Continue);
        }

        if !passes(&policy, source) {
            self.emit(
                DecisionKind::BlockedByRoute,
                source,
                request.route,
                Some(policy.as_ref()),
            );
            return Ok(Verdict::Reject);
        }

        self.emit(
            DecisionKind::Allowed,
            source,
            request.route,
            Some(policy.as_ref()),
        );
        Ok(Verdict::Continue)
    }

    fn emit(
        &self,
        kind: DecisionKind,
        source: Option<IpAddr>,
        route: &str,
        policy: Option<&Policy>,
    ) {
        self.observer.on_decision(&DecisionEvent {
            kind,
            source,
            route,
            policy: policy.map(Policy::name),
            mode: policy.map(Policy::mode),
        });
    }
}

/// Single-stage check. An unknown source only passes if the policy lets
/// unknown sources through; a disabled policy never blocks, at either stage
/// and whatever its `block_unknown_source` says.
fn passes(policy: &Policy, source: Option<IpAddr>) -> bool {
    if policy.mode() == PolicyMode::Disabled {
        return true;
    }
    match source {
        Some(addr) => policy.is_allowed(addr),
        None => !policy.block_unknown_source(),
    }
}

/// IPv4-mapped IPv6 addresses compare as plain IPv4
pub fn normalize(addr: IpAddr) -> IpAddr {
    addr.to_canonical()
}
