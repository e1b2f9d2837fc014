//! PASSporT signing and verification (RFC 8225 / 8588)
//!
//! Tokens are compact JWS strings signed with ES256. The certificate URL
//! travels in the protected header as `x5u` and is never part of the claims.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use p256::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::attestation::AttestationLevel;
use crate::certificate::{CachedCertificateSource, CertificateSource, HttpCertificateSource};
use crate::config::StirConfig;
use crate::error::{Result, StirError};

/// Lifetime of a signed token
pub const PASSPORT_TTL_SECONDS: i64 = 300;

const PASSPORT_TYPE: &str = "passport";

/// Originating identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrigClaim {
    pub tn: String,
}

/// Destination identities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestClaim {
    pub tn: Vec<String>,
}

/// Claims carried by a PASSporT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passport {
    pub attest: AttestationLevel,
    pub dest: DestClaim,
    pub iat: i64,
    pub exp: i64,
    pub orig: OrigClaim,
    /// Unique origination identifier
    pub origid: String,
    /// Call correlation id (the SIP Call-ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// `x5u` the token was verified against; filled in by the verifier
    #[serde(skip)]
    pub certificate_url: Option<String>,
}

impl Passport {
    pub fn orig_tn(&self) -> &str {
        &self.orig.tn
    }

    pub fn dest_tns(&self) -> &[String] {
        &self.dest.tn
    }
}

/// Signs PASSporTs with a P-256 key
pub struct PassportSigner {
    key: EncodingKey,
    public_key: PublicKey,
    certificate_url: String,
    attestation: AttestationLevel,
}

impl PassportSigner {
    pub fn new(
        secret_key: &SecretKey,
        certificate_url: impl Into<String>,
        attestation: AttestationLevel,
    ) -> Result<Self> {
        let der = secret_key
            .to_pkcs8_der()
            .map_err(|e| StirError::Signing(format!("Failed to encode signing key: {}", e)))?;

        Ok(Self {
            key: EncodingKey::from_ec_der(der.as_bytes()),
            public_key: secret_key.public_key(),
            certificate_url: certificate_url.into(),
            attestation,
        })
    }

    /// Build a signer from a PKCS#8 PEM private key
    pub fn from_pkcs8_pem(
        pem: &str,
        certificate_url: impl Into<String>,
        attestation: AttestationLevel,
    ) -> Result<Self> {
        let secret_key = SecretKey::from_pkcs8_pem(pem)
            .map_err(|e| StirError::Signing(format!("Invalid P-256 private key: {}", e)))?;
        Self::new(&secret_key, certificate_url, attestation)
    }

    pub fn certificate_url(&self) -> &str {
        &self.certificate_url
    }

    pub fn attestation(&self) -> AttestationLevel {
        self.attestation
    }

    /// Public half of the signing key
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign a token issued now
    pub fn sign(&self, orig_tn: &str, dest_tn: &str, call_id: &str) -> Result<String> {
        self.sign_at(orig_tn, dest_tn, call_id, chrono::Utc::now().timestamp())
    }

    /// Sign a token issued now at `attestation` instead of the configured level
    pub fn sign_with_attestation(
        &self,
        orig_tn: &str,
        dest_tn: &str,
        call_id: &str,
        attestation: AttestationLevel,
    ) -> Result<String> {
        self.sign_claims(orig_tn, dest_tn, call_id, attestation, chrono::Utc::now().timestamp())
    }

    /// Sign a token with an explicit issue time (unix seconds)
    pub fn sign_at(&self, orig_tn: &str, dest_tn: &str, call_id: &str, issued_at: i64) -> Result<String> {
        self.sign_claims(orig_tn, dest_tn, call_id, self.attestation, issued_at)
    }

    fn sign_claims(
        &self,
        orig_tn: &str,
        dest_tn: &str,
        call_id: &str,
        attestation: AttestationLevel,
        issued_at: i64,
    ) -> Result<String> {
        if orig_tn.is_empty() || dest_tn.is_empty() {
            return Err(StirError::Signing("originating and destination numbers are required".to_string()));
        }

        let claims = Passport {
            attest: attestation,
            dest: DestClaim {
                tn: vec![dest_tn.to_string()],
            },
            iat: issued_at,
            exp: issued_at + PASSPORT_TTL_SECONDS,
            orig: OrigClaim {
                tn: orig_tn.to_string(),
            },
            origid: uuid::Uuid::new_v4().to_string(),
            jti: (!call_id.is_empty()).then(|| call_id.to_string()),
            certificate_url: None,
        };

        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some(PASSPORT_TYPE.to_string());
        header.x5u = Some(self.certificate_url.clone());

        let token = encode(&header, &claims, &self.key)
            .map_err(|e| StirError::Signing(e.to_string()))?;

        debug!(
            "Signed PASSporT for {} -> {} with attestation {}",
            orig_tn, dest_tn, attestation
        );
        Ok(token)
    }
}

/// Verifies PASSporTs against keys resolved from their `x5u`
pub struct PassportVerifier {
    certificates: Arc<dyn CertificateSource>,
    leeway_seconds: u64,
}

impl PassportVerifier {
    pub fn new(certificates: Arc<dyn CertificateSource>) -> Self {
        Self {
            certificates,
            leeway_seconds: 60,
        }
    }

    /// HTTPS certificate fetches behind a bounded TTL cache, as configured
    pub fn from_config(config: &StirConfig) -> Result<Self> {
        let http = HttpCertificateSource::new(config.fetch_timeout())?;
        let cached = CachedCertificateSource::new(http, config.certificate_cache_ttl())
            .with_max_entries(config.certificate_cache_max_entries);
        Ok(Self::new(Arc::new(cached)).with_leeway(config.leeway_seconds))
    }

    /// Clock skew tolerated on `exp`
    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    /// Check signature and expiry, returning the claims
    pub async fn verify(&self, token: &str) -> Result<Passport> {
        let header = decode_header(token)
            .map_err(|e| StirError::InvalidToken(format!("Failed to decode header: {}", e)))?;

        if header.alg != Algorithm::ES256 {
            warn!("Rejecting PASSporT signed with {:?}", header.alg);
            return Err(StirError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let certificate_url = header.x5u.ok_or(StirError::MissingCertificateUrl)?;
        let public_key = self.certificates.fetch(&certificate_url).await?;
        let decoding_key = decoding_key(&public_key)?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_aud = false;
        validation.leeway = self.leeway_seconds;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Passport>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => StirError::TokenExpired,
            ErrorKind::InvalidSignature => StirError::SignatureInvalid,
            ErrorKind::InvalidAlgorithm => StirError::UnsupportedAlgorithm(format!("{:?}", header.alg)),
            _ => StirError::InvalidToken(e.to_string()),
        })?;

        let mut passport = data.claims;
        passport.certificate_url = Some(certificate_url);
        Ok(passport)
    }

    /// Verify and require at least `minimum` attestation
    pub async fn verify_with_minimum(&self, token: &str, minimum: AttestationLevel) -> Result<Passport> {
        let passport = self.verify(token).await?;
        if !passport.attest.is_sufficient(minimum) {
            return Err(StirError::InsufficientAttestation {
                actual: passport.attest,
                required: minimum,
            });
        }
        Ok(passport)
    }
}

fn decoding_key(public_key: &PublicKey) -> Result<DecodingKey> {
    let point = public_key.to_encoded_point(false);
    let (x, y) = match (point.x(), point.y()) {
        (Some(x), Some(y)) => (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)),
        _ => return Err(StirError::CertificateParse("public key is the identity point".to_string())),
    };

    DecodingKey::from_ec_components(&x, &y)
        .map_err(|e| StirError::CertificateParse(format!("Invalid EC key components: {}", e)))
}
