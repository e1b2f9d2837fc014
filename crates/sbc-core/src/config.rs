//! Configuration for the border pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use border_stir_core::StirConfig;

use crate::emergency::EmergencyNumber;
use crate::error::{BorderError, Result};

/// Complete border pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BorderConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub stir: StirConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub topology: TopologyConfig,

    #[serde(default)]
    pub emergency: EmergencyConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

impl BorderConfig {
    pub fn builder() -> BorderConfigBuilder {
        BorderConfigBuilder::default()
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.enabled && self.rate_limit.window_seconds == 0 {
            return Err(BorderError::Config(
                "rate limit window must be at least one second".to_string(),
            ));
        }
        if self.emergency.enabled && self.emergency.numbers.is_empty() {
            return Err(BorderError::Config(
                "emergency handling is enabled but no emergency numbers are configured".to_string(),
            ));
        }
        if self.topology.enabled && self.topology.public_identity.is_empty() {
            return Err(BorderError::Config(
                "topology hiding requires a public identity".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-source admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per source per window (0 = unlimited)
    #[serde(default = "default_rate_limit")]
    pub limit: u32,

    /// Window length (seconds)
    #[serde(default = "default_rate_window")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_rate_limit(),
            window_seconds: default_rate_window(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Peering policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed peer domains; subdomains of an entry match too.
    ///
    /// An empty list admits every peer. That is meant for lab setups and is
    /// logged at warn level when the policy engine is built.
    #[serde(default)]
    pub allowed_peers: Vec<String>,

    /// Reject requests that carry no Identity header
    #[serde(default)]
    pub require_identity: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_peers: Vec::new(),
            require_identity: false,
        }
    }
}

/// Split a comma-separated peer list, dropping empty entries
pub fn parse_peer_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|peer| peer.trim().to_ascii_lowercase())
        .filter(|peer| !peer.is_empty())
        .collect()
}

/// Topology hiding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Domain used inside the core network
    #[serde(default = "default_internal_domain")]
    pub internal_domain: String,

    /// Host written into rewritten Via and Contact headers
    #[serde(default = "default_public_identity")]
    pub public_identity: String,

    /// Domain internal From/To URIs are rewritten to
    #[serde(default = "default_public_domain")]
    pub public_domain: String,

    #[serde(default = "default_true")]
    pub strip_server_header: bool,

    #[serde(default = "default_true")]
    pub strip_user_agent: bool,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            internal_domain: default_internal_domain(),
            public_identity: default_public_identity(),
            public_domain: default_public_domain(),
            strip_server_header: true,
            strip_user_agent: true,
        }
    }
}

/// Emergency call handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_emergency_numbers")]
    pub numbers: Vec<EmergencyNumber>,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            numbers: default_emergency_numbers(),
        }
    }
}

/// Structural checks applied before any policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_required_headers")]
    pub required_headers: Vec<String>,

    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required_headers: default_required_headers(),
            allowed_methods: default_allowed_methods(),
        }
    }
}

fn default_true() -> bool { true }
fn default_rate_limit() -> u32 { 100 }
fn default_rate_window() -> u64 { 60 }
fn default_internal_domain() -> String { "ims.internal".to_string() }
fn default_public_identity() -> String { "border.ims.local".to_string() }
fn default_public_domain() -> String { "ims.local".to_string() }
fn default_emergency_numbers() -> Vec<EmergencyNumber> { EmergencyNumber::defaults() }

fn default_required_headers() -> Vec<String> {
    ["Via", "From", "To", "Call-ID", "CSeq"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

fn default_allowed_methods() -> Vec<String> {
    ["INVITE", "ACK", "BYE", "CANCEL", "OPTIONS", "UPDATE", "PRACK"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

/// Builder for [`BorderConfig`]
#[derive(Debug, Default)]
pub struct BorderConfigBuilder {
    config: BorderConfig,
}

impl BorderConfigBuilder {
    pub fn rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.config.rate_limit.enabled = true;
        self.config.rate_limit.limit = limit;
        self.config.rate_limit.window_seconds = window.as_secs();
        self
    }

    pub fn disable_rate_limit(mut self) -> Self {
        self.config.rate_limit.enabled = false;
        self
    }

    pub fn stir(mut self, stir: StirConfig) -> Self {
        self.config.stir = stir;
        self
    }

    pub fn allowed_peers(mut self, peers: Vec<String>) -> Self {
        self.config.policy.allowed_peers = peers;
        self
    }

    pub fn require_identity(mut self, required: bool) -> Self {
        self.config.policy.require_identity = required;
        self
    }

    pub fn disable_policy(mut self) -> Self {
        self.config.policy.enabled = false;
        self
    }

    pub fn topology_hiding(mut self, enabled: bool) -> Self {
        self.config.topology.enabled = enabled;
        self
    }

    pub fn internal_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.topology.internal_domain = domain.into();
        self
    }

    pub fn public_identity(mut self, identity: impl Into<String>) -> Self {
        self.config.topology.public_identity = identity.into();
        self
    }

    pub fn emergency_numbers(mut self, numbers: Vec<EmergencyNumber>) -> Self {
        self.config.emergency.numbers = numbers;
        self
    }

    pub fn disable_emergency(mut self) -> Self {
        self.config.emergency.enabled = false;
        self
    }

    pub fn build(self) -> Result<BorderConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
