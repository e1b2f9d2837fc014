//! Configuration for STIR/SHAKEN signing and verification

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::attestation::AttestationSetting;
use crate::certificate::DEFAULT_MAX_CACHED_CERTIFICATES;

/// STIR/SHAKEN settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StirConfig {
    /// Master switch for both signing and verification
    #[serde(default)]
    pub enabled: bool,

    /// Attestation to sign with, also the minimum accepted on verification
    #[serde(default)]
    pub attestation: AttestationSetting,

    /// Verify Identity headers on INVITEs entering the border
    #[serde(default = "default_true")]
    pub verify_inbound: bool,

    /// Sign INVITEs leaving the border
    #[serde(default = "default_true")]
    pub sign_outbound: bool,

    /// How long a fetched certificate key is reused (seconds)
    #[serde(default = "default_certificate_cache_ttl")]
    pub certificate_cache_ttl_seconds: u64,

    /// Most certificate keys held in the cache at once
    #[serde(default = "default_certificate_cache_max_entries")]
    pub certificate_cache_max_entries: usize,

    /// Upper bound on a single certificate fetch (seconds)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Clock skew tolerated on `exp` (seconds)
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
}

impl Default for StirConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            attestation: AttestationSetting::Auto,
            verify_inbound: true,
            sign_outbound: true,
            certificate_cache_ttl_seconds: default_certificate_cache_ttl(),
            certificate_cache_max_entries: default_certificate_cache_max_entries(),
            fetch_timeout_seconds: default_fetch_timeout(),
            leeway_seconds: default_leeway(),
        }
    }
}

impl StirConfig {
    pub fn certificate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.certificate_cache_ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

fn default_true() -> bool { true }
fn default_certificate_cache_ttl() -> u64 { 300 }
fn default_certificate_cache_max_entries() -> usize { DEFAULT_MAX_CACHED_CERTIFICATES }
fn default_fetch_timeout() -> u64 { 5 }
fn default_leeway() -> u64 { 60 }
