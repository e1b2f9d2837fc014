//! Inter-operator peering policy

use border_sip_message::SipMessage;
use border_stir_core::{AttestationLevel, StirConfig};
use std::collections::HashSet;
use tracing::warn;

use crate::config::PolicyConfig;

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    /// Rejected, with a human-readable reason for the 403
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

/// Peering policy consulted for every non-emergency request
pub trait PolicyEngine: Send + Sync {
    /// Whether `domain` is an accepted peer
    fn is_peer_allowed(&self, domain: &str) -> bool;

    /// Whether `msg` may cross the border
    fn is_call_allowed(&self, msg: &SipMessage) -> PolicyDecision;

    /// Minimum attestation accepted on inbound PASSporTs
    fn attestation_requirement(&self) -> AttestationLevel;
}

/// Allow-list policy with an optional Identity requirement
#[derive(Debug, Clone)]
pub struct SimplePolicyEngine {
    allowed_peers: HashSet<String>,
    require_identity: bool,
    min_attestation: AttestationLevel,
}

impl SimplePolicyEngine {
    pub fn new<I, S>(allowed_peers: I, require_identity: bool, min_attestation: AttestationLevel) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_peers: HashSet<String> = allowed_peers
            .into_iter()
            .map(|peer| peer.as_ref().trim().to_ascii_lowercase())
            .filter(|peer| !peer.is_empty())
            .collect();

        if allowed_peers.is_empty() {
            warn!("Peer allow-list is empty; every peer domain will be accepted");
        }

        Self {
            allowed_peers,
            require_identity,
            min_attestation,
        }
    }

    pub fn from_config(policy: &PolicyConfig, stir: &StirConfig) -> Self {
        Self::new(
            &policy.allowed_peers,
            policy.require_identity,
            stir.attestation.resolve(),
        )
    }
}

impl PolicyEngine for SimplePolicyEngine {
    fn is_peer_allowed(&self, domain: &str) -> bool {
        if self.allowed_peers.is_empty() {
            return true;
        }

        let domain = domain.trim().to_ascii_lowercase();
        if self.allowed_peers.contains(&domain) {
            return true;
        }

        self.allowed_peers.iter().any(|allowed| {
            domain.len() > allowed.len() + 1
                && domain.ends_with(allowed.as_str())
                && domain.as_bytes()[domain.len() - allowed.len() - 1] == b'.'
        })
    }

    fn is_call_allowed(&self, msg: &SipMessage) -> PolicyDecision {
        let domain = msg.header("From").map(extract_domain).unwrap_or_default();
        if !self.is_peer_allowed(domain) {
            return PolicyDecision::Deny(format!("peer domain not allowed: {}", domain));
        }

        if self.require_identity && msg.header("Identity").map_or(true, |v| v.trim().is_empty()) {
            return PolicyDecision::Deny("STIR/SHAKEN Identity header required".to_string());
        }

        PolicyDecision::Allow
    }

    fn attestation_requirement(&self) -> AttestationLevel {
        self.min_attestation
    }
}

/// Host part of a From / To / Contact value
pub fn extract_domain(value: &str) -> &str {
    let Some((_, host)) = value.split_once('@') else {
        return "";
    };
    host.split(|c| matches!(c, ';' | '>' | ':'))
        .next()
        .unwrap_or_default()
        .trim()
}
