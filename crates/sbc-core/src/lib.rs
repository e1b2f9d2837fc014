//! Session Border Controller (SBC) Core Component
//!
//! This crate implements the border security pipeline that every SIP
//! message crossing the operator boundary runs through:
//! - Security / Rate Limiting (per source, fixed window)
//! - Emergency call detection, PSAP routing and control bypass
//! - Peering policy (allow-listed peer domains, required Identity)
//! - STIR/SHAKEN verification and signing (via `border-stir-core`)
//! - Topology Hiding and header normalization
//!
//! # Architecture Note
//! [`BorderPipeline`] is the only entry point callers need. Its stages are
//! plain components ([`RateLimiter`], [`EmergencyRouter`], [`TopologyHider`],
//! ...) that can also be used on their own. Policy, certificate lookup and
//! method handling are traits so hosts can swap in their own implementations.
//!
//! ```ignore
//! use border_sbc_core::{BorderConfig, BorderPipeline};
//!
//! let pipeline = BorderPipeline::builder(BorderConfig::default()).build()?;
//! let processed = pipeline.process_message(&mut message, source).await?;
//! ```

pub mod config;
pub mod emergency;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod policy;
pub mod rate_limit;
pub mod topology;

pub use config::{
    parse_peer_list, BorderConfig, BorderConfigBuilder, EmergencyConfig, PolicyConfig,
    RateLimitConfig, StirConfig, TopologyConfig, ValidationConfig,
};
pub use emergency::{
    dialed_number, EmergencyDetector, EmergencyNumber, EmergencyPolicy, EmergencyRouter,
    LocationHandler,
};
pub use error::{BorderError, Result};
pub use handler::{ForwardHandler, MessageHandler};
pub use metrics::{BorderEvent, BorderMetrics, CountingMetrics, NoopMetrics};
pub use normalize::{canonical_header_name, normalize_from_to, normalize_headers, normalize_uri};
pub use pipeline::{BorderPipeline, BorderPipelineBuilder, Processed, Verdict};
pub use policy::{extract_domain, PolicyDecision, PolicyEngine, SimplePolicyEngine};
pub use rate_limit::{RateLimitWindow, RateLimiter, DEFAULT_SWEEP_INTERVAL};
pub use topology::TopologyHider;
