//! Certificate sources
//!
//! A verifier only needs "the public key behind this `x5u` URL". Sources
//! resolve that over HTTPS, from a TTL cache in front of another source, or
//! from an in-memory table (tests, and a signer verifying its own tokens).

use async_trait::async_trait;
use dashmap::DashMap;
use p256::pkcs8::DecodePublicKey;
use p256::PublicKey;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, StirError};

/// Upper bound on a certificate body
const MAX_CERTIFICATE_BYTES: usize = 16 * 1024;

/// Default bound on cached certificate keys
pub const DEFAULT_MAX_CACHED_CERTIFICATES: usize = 1024;

/// Resolves a certificate URL to the P-256 key that signs with it
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PublicKey>;
}

/// Fetches PEM certificates over HTTPS
pub struct HttpCertificateSource {
    client: reqwest::Client,
    timeout: Duration,
    allow_insecure_http: bool,
}

impl HttpCertificateSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StirError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            allow_insecure_http: false,
        })
    }

    /// Accept plain `http://` certificate URLs (lab setups only)
    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StirError::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(StirError::fetch(
                url,
                format!("certificate fetch failed with status: {}", response.status()),
            ));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_CERTIFICATE_BYTES as u64 {
                return Err(too_large(url, length));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| StirError::fetch(url, e))? {
            if body.len() + chunk.len() > MAX_CERTIFICATE_BYTES {
                return Err(too_large(url, (body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

fn too_large(url: &str, length: u64) -> StirError {
    StirError::fetch(url, format!("certificate body too large ({} bytes)", length))
}

#[async_trait]
impl CertificateSource for HttpCertificateSource {
    async fn fetch(&self, url: &str) -> Result<PublicKey> {
        let secure = url.starts_with("https://");
        if !secure && !(self.allow_insecure_http && url.starts_with("http://")) {
            return Err(StirError::fetch(url, "certificate URL must use https"));
        }

        debug!("Fetching STIR certificate from {}", url);
        let body = tokio::time::timeout(self.timeout, self.download(url))
            .await
            .map_err(|_| StirError::fetch(url, "certificate fetch timed out"))??;

        public_key_from_pem(&body)
    }
}

/// TTL cache keyed by certificate URL in front of another source.
///
/// Only successful fetches are cached. The URL comes from the peer, so the
/// cache holds at most `max_entries`: a full cache first drops expired
/// entries, then the oldest one.
pub struct CachedCertificateSource<S> {
    inner: S,
    ttl: Duration,
    max_entries: usize,
    entries: Arc<DashMap<String, (PublicKey, Instant)>>,
}

impl<S: CertificateSource> CachedCertificateSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            max_entries: DEFAULT_MAX_CACHED_CERTIFICATES,
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Purge expired entries every `every` until the cache is dropped
    pub fn spawn_purger(&self, every: Duration) -> JoinHandle<()> {
        let entries: Weak<DashMap<String, (PublicKey, Instant)>> = Arc::downgrade(&self.entries);
        let ttl = self.ttl;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(entries) = entries.upgrade() else {
                    debug!("Certificate cache dropped, stopping purger");
                    break;
                };
                purge_entries(&entries, ttl);
            }
        })
    }

    /// Drop a cached key, e.g. after a verification failure
    pub fn invalidate(&self, url: &str) {
        self.entries.remove(url);
    }

    /// Remove every expired entry
    pub fn purge_expired(&self) {
        purge_entries(&self.entries, self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cached(&self, url: &str) -> Option<PublicKey> {
        let entry = self.entries.get(url)?;
        let (key, fetched_at) = *entry;
        if fetched_at.elapsed() < self.ttl {
            return Some(key);
        }
        drop(entry);
        self.entries.remove(url);
        None
    }

    fn store(&self, url: &str, key: PublicKey) {
        if !self.entries.contains_key(url) && self.entries.len() >= self.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.value().1)
                    .map(|entry| entry.key().clone());
                if let Some(oldest) = oldest {
                    debug!("Certificate cache full, evicting {}", oldest);
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(url.to_string(), (key, Instant::now()));
    }
}

fn purge_entries(entries: &DashMap<String, (PublicKey, Instant)>, ttl: Duration) {
    let before = entries.len();
    entries.retain(|_, (_, fetched_at)| fetched_at.elapsed() < ttl);
    let removed = before.saturating_sub(entries.len());
    if removed > 0 {
        debug!("Purged {} expired STIR certificates", removed);
    }
}

#[async_trait]
impl<S: CertificateSource> CertificateSource for CachedCertificateSource<S> {
    async fn fetch(&self, url: &str) -> Result<PublicKey> {
        if let Some(key) = self.cached(url) {
            debug!("STIR certificate cache hit for {}", url);
            return Ok(key);
        }

        let key = self.inner.fetch(url).await?;
        self.store(url, key);
        Ok(key)
    }
}

/// Fixed URL → key table
#[derive(Debug, Clone, Default)]
pub struct StaticCertificateSource {
    keys: HashMap<String, PublicKey>,
}

impl StaticCertificateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, url: impl Into<String>, key: PublicKey) -> Self {
        self.keys.insert(url.into(), key);
        self
    }
}

#[async_trait]
impl CertificateSource for StaticCertificateSource {
    async fn fetch(&self, url: &str) -> Result<PublicKey> {
        self.keys
            .get(url)
            .copied()
            .ok_or_else(|| StirError::fetch(url, "no certificate registered for URL"))
    }
}

/// P-256 key from a PEM `CERTIFICATE` or `PUBLIC KEY` block.
///
/// Certificates outside their validity period are rejected.
pub fn public_key_from_pem(pem_bytes: &[u8]) -> Result<PublicKey> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem_bytes)
        .map_err(|e| StirError::CertificateParse(format!("Failed to decode PEM: {}", e)))?;

    match pem.label.as_str() {
        "CERTIFICATE" => {
            let cert = pem
                .parse_x509()
                .map_err(|e| StirError::CertificateParse(format!("Failed to parse certificate: {}", e)))?;

            if !cert.validity().is_valid() {
                warn!("STIR certificate is outside its validity period");
                return Err(StirError::CertificateParse(
                    "certificate is outside its validity period".to_string(),
                ));
            }

            let spki = cert.public_key();
            PublicKey::from_sec1_bytes(&spki.subject_public_key.data).map_err(|_| {
                StirError::CertificateParse("certificate does not contain a P-256 public key".to_string())
            })
        }
        "PUBLIC KEY" => PublicKey::from_public_key_der(&pem.contents).map_err(|e| {
            StirError::CertificateParse(format!("Invalid P-256 public key: {}", e))
        }),
        other => Err(StirError::CertificateParse(format!("Unexpected PEM block: {}", other))),
    }
}
