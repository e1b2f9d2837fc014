//! Error types for stir-core

use thiserror::Error;

use crate::attestation::AttestationLevel;

/// Result type alias for STIR operations
pub type Result<T> = std::result::Result<T, StirError>;

/// Errors raised while signing or verifying PASSporT tokens
#[derive(Error, Debug)]
pub enum StirError {
    /// Token could not be decoded or is structurally invalid
    #[error("Invalid PASSporT: {0}")]
    InvalidToken(String),

    /// Signature does not match the certificate key
    #[error("PASSporT signature verification failed")]
    SignatureInvalid,

    /// Token is past its `exp` claim
    #[error("PASSporT has expired")]
    TokenExpired,

    /// Declared algorithm is not the ECDSA family we accept
    #[error("Unsupported PASSporT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Header carries no `x5u` certificate pointer
    #[error("PASSporT header is missing the x5u certificate URL")]
    MissingCertificateUrl,

    /// Certificate could not be retrieved
    #[error("Failed to fetch certificate from {url}: {reason}")]
    CertificateFetch { url: String, reason: String },

    /// Certificate or key material could not be parsed
    #[error("Invalid certificate: {0}")]
    CertificateParse(String),

    /// Signing failed
    #[error("Failed to sign PASSporT: {0}")]
    Signing(String),

    /// Signature is valid but the attestation is below the required level
    #[error("Attestation level insufficient: got {actual}, required {required}")]
    InsufficientAttestation {
        actual: AttestationLevel,
        required: AttestationLevel,
    },

    /// Unknown attestation string
    #[error("Invalid attestation level: {0}")]
    InvalidAttestation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StirError {
    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        StirError::CertificateFetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
