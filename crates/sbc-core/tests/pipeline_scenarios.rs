//! End-to-end scenarios through the border pipeline

use async_trait::async_trait;
use border_sbc_core::{
    BorderConfig, BorderEvent, BorderPipeline, CountingMetrics, MessageHandler, Verdict,
};
use border_sip_message::{Method, SipMessage};
use border_stir_core::{
    parse_identity_header, AttestationLevel, PassportSigner, PassportVerifier,
    StaticCertificateSource, StirConfig,
};
use p256::SecretKey;
use rand::rngs::OsRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const BORDER_CERT: &str = "https://border.example.com/.well-known/stir/cert.pem";
const PEER_CERT: &str = "https://peer.com/.well-known/stir/cert.pem";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn source() -> SocketAddr {
    "198.51.100.7:5060".parse().unwrap()
}

fn invite(from: &str, to: &str) -> SipMessage {
    SipMessage::request(Method::Invite, to)
        .with_header("Via", "SIP/2.0/UDP 198.51.100.7:5060;branch=z9hG4bKpeer1")
        .with_header("From", format!("<{}>;tag=a1", from))
        .with_header("To", format!("<{}>", to))
        .with_header("Call-ID", "call-e2e@peer.com")
        .with_header("CSeq", "1 INVITE")
        .with_header("Contact", "<sip:+15145559876@198.51.100.7:5060>")
}

fn stir_config(attestation: &str) -> StirConfig {
    StirConfig {
        enabled: true,
        attestation: attestation.parse().unwrap(),
        ..StirConfig::default()
    }
}

#[tokio::test]
async fn test_outbound_invite_is_signed_and_verifiable() {
    init_tracing();
    let key = SecretKey::random(&mut OsRng);
    let signer = PassportSigner::new(&key, BORDER_CERT, AttestationLevel::Full).unwrap();
    let config = BorderConfig::builder().stir(stir_config("A")).build().unwrap();
    let metrics = Arc::new(CountingMetrics::new());
    let pipeline = BorderPipeline::builder(config)
        .signer(signer)
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let mut msg = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com");
    let processed = pipeline.process_message(&mut msg, source()).await.unwrap();
    assert_eq!(processed.verdict, Verdict::Forwarded);

    let identity = processed.response.header("Identity").unwrap();
    assert!(!identity.is_empty());
    assert!(identity.contains(";info=<https://border.example.com/.well-known/stir/cert.pem>"));

    let verifier = PassportVerifier::new(Arc::new(
        StaticCertificateSource::new().with_key(BORDER_CERT, key.public_key()),
    ));
    let passport = verifier.verify(&parse_identity_header(identity)).await.unwrap();
    assert_eq!(passport.attest, AttestationLevel::Full);
    assert_eq!(passport.orig.tn, "+15145559876");
    assert_eq!(passport.dest.tn, vec!["+15145551234".to_string()]);
    assert_eq!(passport.jti.as_deref(), Some("call-e2e@peer.com"));
    assert_eq!(metrics.count(BorderEvent::StirSigned), 1);
}

#[tokio::test]
async fn test_emergency_call_bypasses_exhausted_rate_limit() {
    init_tracing();
    let config = BorderConfig::builder()
        .rate_limit(1, Duration::from_secs(60))
        .build()
        .unwrap();
    let pipeline = BorderPipeline::builder(config).build().unwrap();

    let mut first = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com");
    assert!(pipeline.process_message(&mut first, source()).await.unwrap().is_forwarded());

    let mut second = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com");
    let limited = pipeline.process_message(&mut second, source()).await.unwrap();
    assert_eq!(limited.verdict, Verdict::RejectedRateLimit);
    assert_eq!(limited.response.status(), Some(503));
    assert_eq!(limited.response.reason(), Some("Service Unavailable"));
    assert_eq!(limited.response.call_id(), Some("call-e2e@peer.com"));

    let mut emergency = invite("sip:+15145559876@peer.com", "sip:911@ims.local")
        .with_header("Geolocation", "<cid:location@ue.peer.com>");
    let processed = pipeline.process_message(&mut emergency, source()).await.unwrap();
    assert_eq!(processed.verdict, Verdict::Forwarded);
    assert_eq!(processed.response.header("X-Emergency-Route"), Some("psap-us"));
    assert_eq!(processed.response.header("Priority"), Some("emergency"));
    assert_eq!(
        processed.response.header("P-Access-Network-Info"),
        Some("<cid:location@ue.peer.com>")
    );
}

#[tokio::test]
async fn test_uppercase_scheme_emergency_bypasses_exhausted_rate_limit() {
    let config = BorderConfig::builder()
        .rate_limit(1, Duration::from_secs(60))
        .build()
        .unwrap();
    let pipeline = BorderPipeline::builder(config).build().unwrap();

    let mut first = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com");
    assert!(pipeline.process_message(&mut first, source()).await.unwrap().is_forwarded());

    let mut emergency = invite("sip:+15145559876@peer.com", "SIP:911@ims.local");
    let processed = pipeline.process_message(&mut emergency, source()).await.unwrap();
    assert_eq!(processed.verdict, Verdict::Forwarded);
    assert_eq!(processed.response.header("X-Emergency-Route"), Some("psap-us"));
    assert_eq!(processed.response.header("Priority"), Some("emergency"));
}

#[tokio::test]
async fn test_options_to_emergency_number_is_rate_limited() {
    let config = BorderConfig::builder()
        .rate_limit(1, Duration::from_secs(60))
        .build()
        .unwrap();
    let pipeline = BorderPipeline::builder(config).build().unwrap();

    let mut first = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com");
    assert!(pipeline.process_message(&mut first, source()).await.unwrap().is_forwarded());

    let mut options = SipMessage::request(Method::Options, "sip:911@ims.local")
        .with_header("Via", "SIP/2.0/UDP 198.51.100.7:5060;branch=z9hG4bKopt")
        .with_header("From", "<sip:+15145559876@peer.com>;tag=o1")
        .with_header("To", "<sip:911@ims.local>")
        .with_header("Call-ID", "options-911@peer.com")
        .with_header("CSeq", "1 OPTIONS");
    let processed = pipeline.process_message(&mut options, source()).await.unwrap();
    assert_eq!(processed.verdict, Verdict::RejectedRateLimit);
    assert!(processed.response.header("X-Emergency-Route").is_none());
}

#[tokio::test]
async fn test_emergency_call_skips_policy_and_signing() {
    let key = SecretKey::random(&mut OsRng);
    let config = BorderConfig::builder()
        .stir(stir_config("A"))
        .allowed_peers(vec!["peer.com".to_string()])
        .require_identity(true)
        .build()
        .unwrap();
    let metrics = Arc::new(CountingMetrics::new());
    let pipeline = BorderPipeline::builder(config)
        .signer(PassportSigner::new(&key, BORDER_CERT, AttestationLevel::Full).unwrap())
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let mut msg = invite("sip:+441234567890@unknown.net", "sip:+44999@ims.local");
    let processed = pipeline.process_message(&mut msg, source()).await.unwrap();

    assert_eq!(processed.verdict, Verdict::Forwarded);
    assert_eq!(processed.response.header("X-Emergency-Route"), Some("psap-uk"));
    assert!(processed.response.header("Identity").is_none());
    assert_eq!(metrics.count(BorderEvent::EmergencyDetected), 1);
    assert_eq!(metrics.count(BorderEvent::RejectedPolicy), 0);
}

#[tokio::test]
async fn test_unknown_peer_rejected_with_403() {
    let config = BorderConfig::builder()
        .allowed_peers(vec!["peer1.com".to_string()])
        .build()
        .unwrap();
    let pipeline = BorderPipeline::builder(config).build().unwrap();

    let mut allowed = invite("sip:+15145559876@sub.peer1.com", "sip:+15145551234@example.com");
    assert!(pipeline.process_message(&mut allowed, source()).await.unwrap().is_forwarded());

    let mut denied = invite("sip:+15145559876@other.com", "sip:+15145551234@example.com");
    let processed = pipeline.process_message(&mut denied, source()).await.unwrap();
    assert_eq!(processed.verdict, Verdict::RejectedPolicy);
    assert_eq!(processed.response.status(), Some(403));
    assert_eq!(processed.response.reason(), Some("peer domain not allowed: other.com"));
}

#[tokio::test]
async fn test_missing_identity_rejected_when_required() {
    let config = BorderConfig::builder().require_identity(true).build().unwrap();
    let pipeline = BorderPipeline::builder(config).build().unwrap();

    let mut msg = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com");
    let processed = pipeline.process_message(&mut msg, source()).await.unwrap();
    assert_eq!(processed.verdict, Verdict::RejectedPolicy);
    assert_eq!(processed.response.reason(), Some("STIR/SHAKEN Identity header required"));
}

#[tokio::test]
async fn test_missing_header_rejected_with_400() {
    let metrics = Arc::new(CountingMetrics::new());
    let pipeline = BorderPipeline::builder(BorderConfig::default())
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let mut msg = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com");
    msg.remove_header("CSeq");
    let processed = pipeline.process_message(&mut msg, source()).await.unwrap();

    assert_eq!(processed.verdict, Verdict::RejectedMalformed);
    assert_eq!(processed.response.status(), Some(400));
    assert_eq!(processed.response.reason(), Some("Missing required header: CSeq"));
    assert_eq!(metrics.count(BorderEvent::RejectedMalformed), 1);
    assert_eq!(metrics.count(BorderEvent::Forwarded), 0);
}

#[tokio::test]
async fn test_topology_hidden_on_egress() {
    let config = BorderConfig::builder()
        .internal_domain("ims.internal")
        .build()
        .unwrap();
    let pipeline = BorderPipeline::builder(config).build().unwrap();

    let mut msg = invite("sip:+15145559876@ims.internal", "sip:+15145551234@example.com")
        .with_header("Contact", "<sip:alice@192.168.10.4:5060>")
        .with_header("Server", "core-scscf/3.1")
        .with_header("user-agent", "IMS-UE/1.0");
    msg.set_header("Via", "SIP/2.0/UDP 10.20.0.5:5060;branch=z9hG4bKcore;received=10.20.0.5");

    let processed = pipeline.process_message(&mut msg, source()).await.unwrap();
    let out = processed.response;

    assert!(out.header("Server").is_none());
    assert!(out.header("User-Agent").is_none());
    for contact in out.headers.get_all("Contact") {
        assert!(!contact.contains("192.168."), "{contact}");
        assert!(!contact.contains("10."), "{contact}");
    }
    let via = out.header("Via").unwrap();
    assert!(via.starts_with("SIP/2.0/UDP border.ims.local:5060;branch=z9hG4bK"), "{via}");
    assert!(!via.contains("10.20.0.5"));
    assert_eq!(out.header("From"), Some("<sip:+15145559876@ims.local>;tag=a1"));

    let mut response = SipMessage::response(200, "OK")
        .with_header("Via", "SIP/2.0/UDP 10.20.0.5:5060;branch=z9hG4bKcore")
        .with_header("Record-Route", "<sip:scscf.ims.internal;lr>")
        .with_header("From", "<sip:+15145559876@peer.com>;tag=a1")
        .with_header("To", "<sip:+15145551234@example.com>;tag=b2")
        .with_header("call-id", "call-e2e@peer.com")
        .with_header("CSeq", "1 INVITE");
    let processed = pipeline.process_message(&mut response, source()).await.unwrap();
    assert!(processed.is_forwarded());
    assert!(processed.response.header("Record-Route").is_none());
    assert!(processed
        .response
        .headers
        .iter()
        .any(|h| h.name == "Call-ID"));
}

#[tokio::test]
async fn test_inbound_identity_verified() {
    let peer_key = SecretKey::random(&mut OsRng);
    let peer = PassportSigner::new(&peer_key, PEER_CERT, AttestationLevel::Full).unwrap();
    let token = peer.sign("+15145559876", "+15145551234", "call-e2e@peer.com").unwrap();

    let stir = StirConfig {
        sign_outbound: false,
        ..stir_config("B")
    };
    let certificates = StaticCertificateSource::new().with_key(PEER_CERT, peer_key.public_key());
    let pipeline = BorderPipeline::builder(BorderConfig::builder().stir(stir).build().unwrap())
        .verifier(PassportVerifier::new(Arc::new(certificates)))
        .build()
        .unwrap();

    let mut msg = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com")
        .with_header("Identity", format!("{};info=<{}>;alg=ES256;ppt=shaken", token, PEER_CERT));
    pipeline.process_message(&mut msg, source()).await.unwrap();

    assert_eq!(msg.header("X-STIR-Verified"), Some("true"));
    assert_eq!(msg.header("X-STIR-Attestation"), Some("A"));
}

#[tokio::test]
async fn test_verification_failures_are_marked_not_rejected() {
    let peer_key = SecretKey::random(&mut OsRng);
    let gateway = PassportSigner::new(&peer_key, PEER_CERT, AttestationLevel::Gateway).unwrap();
    let low = gateway.sign("+15145559876", "+15145551234", "c-1").unwrap();

    let stir = StirConfig {
        sign_outbound: false,
        ..stir_config("B")
    };
    let certificates = StaticCertificateSource::new().with_key(PEER_CERT, peer_key.public_key());
    let metrics = Arc::new(CountingMetrics::new());
    let pipeline = BorderPipeline::builder(BorderConfig::builder().stir(stir).build().unwrap())
        .verifier(PassportVerifier::new(Arc::new(certificates)))
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let mut insufficient = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com")
        .with_header("Identity", low);
    let processed = pipeline.process_message(&mut insufficient, source()).await.unwrap();
    assert!(processed.is_forwarded());
    assert_eq!(insufficient.header("X-STIR-Verified"), Some("false"));
    assert_eq!(insufficient.header("X-STIR-Attestation"), Some("C"));

    let mut garbage = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com")
        .with_header("Identity", "not-a-passport");
    let processed = pipeline.process_message(&mut garbage, source()).await.unwrap();
    assert!(processed.is_forwarded());
    assert_eq!(garbage.header("X-STIR-Verified"), Some("false"));
    assert!(garbage.header("X-STIR-Attestation").is_none());

    assert_eq!(metrics.count(BorderEvent::StirVerifyFailed), 2);
}

#[tokio::test]
async fn test_resigned_attestation_follows_inbound_verification() {
    let peer_key = SecretKey::random(&mut OsRng);
    let peer = PassportSigner::new(&peer_key, PEER_CERT, AttestationLevel::Full).unwrap();
    let border_key = SecretKey::random(&mut OsRng);

    let certificates = StaticCertificateSource::new().with_key(PEER_CERT, peer_key.public_key());
    let pipeline = BorderPipeline::builder(BorderConfig::builder().stir(stir_config("A")).build().unwrap())
        .signer(PassportSigner::new(&border_key, BORDER_CERT, AttestationLevel::Full).unwrap())
        .verifier(PassportVerifier::new(Arc::new(certificates)))
        .build()
        .unwrap();
    let outbound = PassportVerifier::new(Arc::new(
        StaticCertificateSource::new().with_key(BORDER_CERT, border_key.public_key()),
    ));

    let token = peer.sign("+15145559876", "+15145551234", "call-e2e@peer.com").unwrap();
    let mut verified = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com")
        .with_header("Identity", token);
    let processed = pipeline.process_message(&mut verified, source()).await.unwrap();
    assert_eq!(verified.header("X-STIR-Verified"), Some("true"));
    let identity = processed.response.header("Identity").unwrap();
    let passport = outbound.verify(&parse_identity_header(identity)).await.unwrap();
    assert_eq!(passport.attest, AttestationLevel::Full);

    let mut unverified = invite("sip:+15145559876@peer.com", "sip:+15145551234@example.com")
        .with_header("Identity", "not-a-passport");
    let processed = pipeline.process_message(&mut unverified, source()).await.unwrap();
    assert_eq!(unverified.header("X-STIR-Verified"), Some("false"));
    let identity = processed.response.header("Identity").unwrap();
    let passport = outbound.verify(&parse_identity_header(identity)).await.unwrap();
    assert_eq!(passport.attest, AttestationLevel::Gateway);
}

struct OptionsResponder;

#[async_trait]
impl MessageHandler for OptionsResponder {
    async fn handle(&self, msg: &SipMessage) -> anyhow::Result<SipMessage> {
        Ok(SipMessage::response_to(msg, 200, "OK").with_header("Allow", "INVITE, ACK, BYE, CANCEL, OPTIONS"))
    }
}

struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, _msg: &SipMessage) -> anyhow::Result<SipMessage> {
        anyhow::bail!("downstream unavailable")
    }
}

#[tokio::test]
async fn test_method_handlers() {
    let pipeline = BorderPipeline::builder(BorderConfig::default())
        .handler(Method::Options, Arc::new(OptionsResponder))
        .handler(Method::Bye, Arc::new(FailingHandler))
        .build()
        .unwrap();

    let mut options = SipMessage::request(Method::Options, "sip:border.example.com")
        .with_header("Via", "SIP/2.0/UDP 198.51.100.7:5060;branch=z9hG4bKo")
        .with_header("From", "<sip:monitor@peer.com>;tag=1")
        .with_header("To", "<sip:border.example.com>")
        .with_header("Call-ID", "opt-1")
        .with_header("CSeq", "1 OPTIONS");
    let processed = pipeline.process_message(&mut options, source()).await.unwrap();
    assert_eq!(processed.response.status(), Some(200));
    assert!(processed.response.header("Allow").is_some());

    let mut bye = SipMessage::request(Method::Bye, "sip:+15145551234@example.com")
        .with_header("Via", "SIP/2.0/UDP 198.51.100.7:5060;branch=z9hG4bKb")
        .with_header("From", "<sip:+15145559876@peer.com>;tag=1")
        .with_header("To", "<sip:+15145551234@example.com>;tag=2")
        .with_header("Call-ID", "bye-1")
        .with_header("CSeq", "2 BYE");
    let err = pipeline.process_message(&mut bye, source()).await.unwrap_err();
    assert_eq!(err.to_string(), "downstream unavailable");
}
