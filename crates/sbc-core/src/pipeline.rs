//! The border pipeline
//!
//! Every message crossing the border runs the same ordered stages:
//!
//! 0. emergency classification from the Request-URI
//! 1. per-source rate limiting (503), bypassed for emergency calls
//! 2. structural validation (400)
//! 3. header name normalization
//! 4. emergency handling: Priority, PSAP route, location
//! 5. peering policy (403), bypassed for emergency calls
//! 6. STIR verification of INVITEs carrying Identity, never fatal
//! 7. topology hiding
//! 8. From / To URI normalization
//! 9. STIR signing of INVITEs, at gateway level when verification failed
//! 10. dispatch to the method handler
//!
//! A stage only sees what earlier stages wrote into the message headers.

use border_sip_message::{Method, SipMessage};
use border_stir_core::{
    extract_tn, identity_header_value, parse_identity_header, AttestationLevel, PassportSigner,
    PassportVerifier, StirError,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BorderConfig;
use crate::emergency::{EmergencyDetector, EmergencyNumber, EmergencyPolicy, EmergencyRouter, LocationHandler};
use crate::error::Result;
use crate::handler::{ForwardHandler, MessageHandler};
use crate::metrics::{BorderEvent, BorderMetrics, NoopMetrics};
use crate::normalize::{normalize_from_to, normalize_headers};
use crate::policy::{PolicyDecision, PolicyEngine, SimplePolicyEngine};
use crate::rate_limit::{RateLimiter, DEFAULT_SWEEP_INTERVAL};
use crate::topology::TopologyHider;

/// What the pipeline decided for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Passed every stage; `response` is the handler's output
    Forwarded,
    /// Source exceeded its window; answered 503
    RejectedRateLimit,
    /// Peering policy refused it; answered 403
    RejectedPolicy,
    /// Failed structural validation; answered 400
    RejectedMalformed,
}

/// Result of [`BorderPipeline::process_message`]
#[derive(Debug, Clone)]
pub struct Processed {
    pub verdict: Verdict,
    /// Synthetic final response for rejections, handler output otherwise
    pub response: SipMessage,
}

impl Processed {
    fn rejected(verdict: Verdict, msg: &SipMessage, status: u16, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            response: SipMessage::response_to(msg, status, reason),
        }
    }

    pub fn is_forwarded(&self) -> bool {
        self.verdict == Verdict::Forwarded
    }
}

/// Border security pipeline
pub struct BorderPipeline {
    config: BorderConfig,
    rate_limiter: Option<RateLimiter>,
    router: Option<EmergencyRouter>,
    emergency_policy: EmergencyPolicy,
    location: LocationHandler,
    policy: Option<Arc<dyn PolicyEngine>>,
    signer: Option<Arc<PassportSigner>>,
    verifier: Option<Arc<PassportVerifier>>,
    topology: Option<TopologyHider>,
    allowed_methods: Vec<Method>,
    metrics: Arc<dyn BorderMetrics>,
    handlers: HashMap<Method, Arc<dyn MessageHandler>>,
    default_handler: Arc<dyn MessageHandler>,
}

impl BorderPipeline {
    pub fn builder(config: BorderConfig) -> BorderPipelineBuilder {
        BorderPipelineBuilder::new(config)
    }

    pub fn config(&self) -> &BorderConfig {
        &self.config
    }

    /// Start the rate limiter's idle-window sweeper, if rate limiting is on
    pub fn spawn_maintenance(&self) -> Option<JoinHandle<()>> {
        self.rate_limiter
            .as_ref()
            .map(|limiter| limiter.spawn_sweeper(DEFAULT_SWEEP_INTERVAL))
    }

    /// Run `msg` through every border stage.
    ///
    /// Headers are rewritten in place. Rejections come back as `Ok` with a
    /// synthetic response; `Err` is reserved for handler failures.
    pub async fn process_message(&self, msg: &mut SipMessage, source: SocketAddr) -> Result<Processed> {
        self.metrics.record(BorderEvent::Received);
        if msg.source.is_none() {
            msg.source = Some(source);
        }
        let call_id = msg.call_id().unwrap_or_default().to_string();

        let emergency = self.classify(msg);
        let is_emergency = emergency.is_some();

        if let Some(limiter) = &self.rate_limiter {
            if self.emergency_policy.should_bypass_rate_limit(is_emergency) {
                debug!(source = %source, call_id = %call_id, "Emergency call bypasses rate limiting");
            } else if !limiter.allow(source.ip()) {
                info!(source = %source, call_id = %call_id, "Rate limit exceeded");
                self.metrics.record(BorderEvent::RateLimited);
                return Ok(Processed::rejected(
                    Verdict::RejectedRateLimit,
                    msg,
                    503,
                    "Service Unavailable",
                ));
            }
        }

        if let Err(reason) = self.validate(msg) {
            warn!(source = %source, call_id = %call_id, "Rejecting malformed message: {}", reason);
            self.metrics.record(BorderEvent::RejectedMalformed);
            return Ok(Processed::rejected(Verdict::RejectedMalformed, msg, 400, reason));
        }

        normalize_headers(msg);

        // Only this pipeline may assert a PSAP route
        msg.remove_header("X-Emergency-Route");
        if let Some(number) = &emergency {
            self.handle_emergency(msg, number);
        }

        if msg.is_request() && !self.emergency_policy.should_bypass_restrictions(is_emergency) {
            if let Some(policy) = &self.policy {
                if let PolicyDecision::Deny(reason) = policy.is_call_allowed(msg) {
                    warn!(source = %source, call_id = %call_id, "Policy rejected request: {}", reason);
                    self.metrics.record(BorderEvent::RejectedPolicy);
                    return Ok(Processed::rejected(Verdict::RejectedPolicy, msg, 403, reason));
                }
            }
        }

        let bypass_stir = self.emergency_policy.should_bypass_stir(is_emergency);

        // Verification results are only trusted when set here
        msg.remove_header("X-STIR-Verified");
        msg.remove_header("X-STIR-Attestation");
        if msg.is_method(&Method::Invite) && !bypass_stir {
            self.verify_identity(msg).await;
        }

        if let Some(hider) = &self.topology {
            hider.hide(msg);
            let topology = hider.config();
            normalize_from_to(msg, &topology.internal_domain, &topology.public_domain);
        }

        if msg.is_method(&Method::Invite) && !bypass_stir {
            self.sign_identity(msg);
        }

        let handler = msg
            .method()
            .and_then(|method| self.handlers.get(method))
            .unwrap_or(&self.default_handler);
        let response = handler.handle(msg).await?;

        self.metrics.record(BorderEvent::Forwarded);
        Ok(Processed {
            verdict: Verdict::Forwarded,
            response,
        })
    }

    fn classify(&self, msg: &SipMessage) -> Option<EmergencyNumber> {
        self.router.as_ref()?.classify(msg).cloned()
    }

    fn validate(&self, msg: &SipMessage) -> std::result::Result<(), String> {
        if let Some(method) = msg.method() {
            if !self.allowed_methods.contains(method) {
                return Err(format!("Method not allowed: {}", method));
            }
        }
        if let Some(status) = msg.status() {
            if !(100..=699).contains(&status) {
                return Err(format!("Invalid status code: {}", status));
            }
        }

        let missing = self
            .config
            .validation
            .required_headers
            .iter()
            .find(|name| msg.header(name).map_or(true, |value| value.trim().is_empty()));
        match missing {
            Some(name) => Err(format!("Missing required header: {}", name)),
            None => Ok(()),
        }
    }

    fn handle_emergency(&self, msg: &mut SipMessage, number: &EmergencyNumber) {
        let priority = self.emergency_policy.priority(true);
        let route = match self.router.as_ref().map(|router| router.route_emergency(msg)) {
            Some(Ok(route)) => route.to_string(),
            _ => number.psap_route.clone(),
        };

        warn!(
            call_id = msg.call_id().unwrap_or_default(),
            emergency = %number.number,
            psap_route = %route,
            priority,
            "EMERGENCY CALL DETECTED"
        );
        self.metrics.record(BorderEvent::EmergencyDetected);

        self.location.carry_location(msg);
        msg.set_header("Priority", "emergency");
        msg.set_header("X-Emergency-Route", route);
    }

    fn attestation_requirement(&self) -> AttestationLevel {
        match &self.policy {
            Some(policy) => policy.attestation_requirement(),
            None => self.config.stir.attestation.resolve(),
        }
    }

    async fn verify_identity(&self, msg: &mut SipMessage) {
        if !(self.config.stir.enabled && self.config.stir.verify_inbound) {
            return;
        }
        let Some(verifier) = &self.verifier else {
            return;
        };
        let Some(token) = msg.header("Identity").map(parse_identity_header) else {
            return;
        };

        let minimum = self.attestation_requirement();
        match verifier.verify_with_minimum(&token, minimum).await {
            Ok(passport) => {
                debug!(
                    call_id = msg.call_id().unwrap_or_default(),
                    orig = %passport.orig.tn,
                    attestation = %passport.attest,
                    "STIR verification succeeded"
                );
                self.metrics.record(BorderEvent::StirVerified);
                msg.set_header("X-STIR-Verified", "true");
                msg.set_header("X-STIR-Attestation", passport.attest.as_str());
            }
            Err(StirError::InsufficientAttestation { actual, required }) => {
                warn!(
                    call_id = msg.call_id().unwrap_or_default(),
                    "STIR attestation insufficient: got {}, required {}", actual, required
                );
                self.metrics.record(BorderEvent::StirVerifyFailed);
                msg.set_header("X-STIR-Verified", "false");
                msg.set_header("X-STIR-Attestation", actual.as_str());
            }
            Err(e) => {
                warn!(call_id = msg.call_id().unwrap_or_default(), "STIR verification failed: {}", e);
                self.metrics.record(BorderEvent::StirVerifyFailed);
                msg.set_header("X-STIR-Verified", "false");
            }
        }
    }

    fn sign_identity(&self, msg: &mut SipMessage) {
        if !(self.config.stir.enabled && self.config.stir.sign_outbound) {
            return;
        }
        let Some(signer) = &self.signer else {
            return;
        };

        let orig = msg.header("From").and_then(extract_tn);
        let dest = msg.header("To").and_then(extract_tn);
        let (Some(orig), Some(dest)) = (orig, dest) else {
            debug!(
                call_id = msg.call_id().unwrap_or_default(),
                "No telephone numbers in From/To, skipping STIR signing"
            );
            self.metrics.record(BorderEvent::StirSigningSkipped);
            return;
        };

        // A caller whose inbound Identity failed is only vouched for as a gateway
        let attestation = if msg.header("X-STIR-Verified") == Some("false") {
            AttestationLevel::Gateway
        } else {
            signer.attestation()
        };

        let call_id = msg.call_id().unwrap_or_default().to_string();
        match signer.sign_with_attestation(&orig, &dest, &call_id, attestation) {
            Ok(token) => {
                msg.set_header("Identity", identity_header_value(&token, signer.certificate_url()));
                self.metrics.record(BorderEvent::StirSigned);
                debug!(call_id = %call_id, "Signed INVITE with attestation {}", attestation);
            }
            Err(e) => {
                warn!(call_id = %call_id, "STIR signing failed: {}", e);
            }
        }
    }
}

/// Builder for [`BorderPipeline`]
pub struct BorderPipelineBuilder {
    config: BorderConfig,
    signer: Option<Arc<PassportSigner>>,
    verifier: Option<Arc<PassportVerifier>>,
    policy: Option<Arc<dyn PolicyEngine>>,
    metrics: Arc<dyn BorderMetrics>,
    handlers: HashMap<Method, Arc<dyn MessageHandler>>,
    default_handler: Arc<dyn MessageHandler>,
}

impl BorderPipelineBuilder {
    pub fn new(config: BorderConfig) -> Self {
        Self {
            config,
            signer: None,
            verifier: None,
            policy: None,
            metrics: Arc::new(NoopMetrics),
            handlers: HashMap::new(),
            default_handler: Arc::new(ForwardHandler),
        }
    }

    pub fn signer(mut self, signer: PassportSigner) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    pub fn verifier(mut self, verifier: PassportVerifier) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Replace the allow-list policy built from configuration
    pub fn policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn BorderMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn handler(mut self, method: Method, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    pub fn default_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.default_handler = handler;
        self
    }

    pub fn build(self) -> Result<BorderPipeline> {
        let config = self.config;
        config.validate()?;

        let stir = &config.stir;
        if stir.enabled && stir.sign_outbound && self.signer.is_none() {
            warn!("STIR is enabled but no signer is configured; outbound INVITEs will not be signed");
        }
        if stir.enabled && stir.verify_inbound && self.verifier.is_none() {
            warn!("STIR is enabled but no verifier is configured; Identity headers will not be checked");
        }

        let rate_limiter = config
            .rate_limit
            .enabled
            .then(|| RateLimiter::new(config.rate_limit.limit, config.rate_limit.window()));

        let router = config
            .emergency
            .enabled
            .then(|| EmergencyRouter::new(EmergencyDetector::new(config.emergency.numbers.clone())));

        let policy = match (config.policy.enabled, self.policy) {
            (false, _) => None,
            (true, Some(policy)) => Some(policy),
            (true, None) => Some(Arc::new(SimplePolicyEngine::from_config(&config.policy, &config.stir))
                as Arc<dyn PolicyEngine>),
        };

        let topology = config
            .topology
            .enabled
            .then(|| TopologyHider::new(config.topology.clone()));

        let allowed_methods = config
            .validation
            .allowed_methods
            .iter()
            .map(|m| Method::from(m.as_str()))
            .collect();

        info!(
            rate_limit = config.rate_limit.enabled,
            emergency = config.emergency.enabled,
            policy = config.policy.enabled,
            stir = config.stir.enabled,
            topology_hiding = config.topology.enabled,
            "Border pipeline configured"
        );

        Ok(BorderPipeline {
            rate_limiter,
            router,
            emergency_policy: EmergencyPolicy,
            location: LocationHandler,
            policy,
            signer: self.signer,
            verifier: self.verifier,
            topology,
            allowed_methods,
            metrics: self.metrics,
            handlers: self.handlers,
            default_handler: self.default_handler,
            config,
        })
    }
}
