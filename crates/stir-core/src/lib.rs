//! # STIR-Core - Caller Identity Attestation for the Border Pipeline
//!
//! This crate builds and checks PASSporT tokens (RFC 8225) carried in the
//! SIP Identity header (RFC 8224), using the SHAKEN attestation levels.
//!
//! - [`PassportSigner`] signs originating / destination numbers with an
//!   ES256 key and points verifiers at the matching certificate via `x5u`
//! - [`PassportVerifier`] resolves `x5u` through a [`CertificateSource`],
//!   checks the signature and expiry, and rebuilds the claims
//! - [`identity`] holds the Identity header transport helpers

pub mod attestation;

pub mod certificate;

pub mod config;

pub mod error;

pub mod identity;

pub mod passport;

pub use attestation::{AttestationLevel, AttestationSetting};

pub use certificate::{
    public_key_from_pem, CachedCertificateSource, CertificateSource, HttpCertificateSource,
    StaticCertificateSource, DEFAULT_MAX_CACHED_CERTIFICATES,
};

pub use config::StirConfig;

pub use error::{Result, StirError};

pub use identity::{extract_tn, format_identity_header, identity_header_value, parse_identity_header};

pub use passport::{DestClaim, OrigClaim, Passport, PassportSigner, PassportVerifier, PASSPORT_TTL_SECONDS};
