//! Per-host TLS configuration assembly.
//!
//! [`CertificateAuthority`] turns a host into a ready `rustls::ServerConfig`:
//!
//! 1. Strip the port and normalize the host.
//! 2. With a cache: return the cached leaf on a hit, no forging.
//! 3. On a miss (or without a cache): forge, decode the PEM pair into DER.
//! 4. With a cache: store the new leaf under the bare host.
//!
//! Concurrent misses for the same host are collapsed. The first caller takes
//! a per-host lock and forges; the others wait on that lock, find the entry
//! in the cache and reuse it. Different hosts never wait on each other.
//!
//! # ALPN
//!
//! Server configs advertise only `http/1.1`. The relay behind the TLS
//! termination copies bytes and cannot follow HTTP/2 framing.

use super::anchor::RootTrustAnchor;
use super::cache::CertificateCache;
use super::error::{AuthorityError, AuthorityResult};
use super::forge::{ForgedPem, LeafForge};
use super::host::HostIdentity;
use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Decoded leaf certificate and key for one host.
pub struct LeafCertificate {
    host: String,
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    cert_pem: String,
}

impl LeafCertificate {
    /// Decode a forged PEM pair.
    pub fn from_pem(host: &str, forged: &ForgedPem) -> AuthorityResult<Self> {
        let cert_chain: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut forged.cert_pem.as_bytes())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AuthorityError::Pem(format!("certificate: {}", e)))?;

        if cert_chain.is_empty() {
            return Err(AuthorityError::Pem("no certificate found".into()));
        }

        let key = rustls_pemfile::private_key(&mut forged.key_pem.as_bytes())
            .map_err(|e| AuthorityError::Pem(format!("private key: {}", e)))?
            .ok_or_else(|| AuthorityError::Pem("no private key found".into()))?;

        Ok(Self {
            host: host.to_string(),
            cert_chain,
            key,
            cert_pem: forged.cert_pem.clone(),
        })
    }

    /// Bare host this leaf was forged for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Leaf certificate, DER.
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_chain[0]
    }

    /// Leaf certificate, PEM.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Private key, DER.
    pub fn key_der(&self) -> &[u8] {
        self.key.secret_der()
    }

    /// Wrap this leaf in a server-side TLS configuration.
    pub fn server_config(&self) -> AuthorityResult<Arc<ServerConfig>> {
        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

impl fmt::Debug for LeafCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafCertificate")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Snapshot of authority counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    /// Lookups answered from the cache.
    pub cache_hits: u64,
    /// Lookups that had to forge (always counted when no cache is set).
    pub cache_misses: u64,
    /// Leaves successfully forged.
    pub leaves_issued: u64,
}

/// Certificate authority: cache lookup plus on-demand forging.
pub struct CertificateAuthority {
    forge: LeafForge,
    cache: Option<Arc<dyn CertificateCache>>,
    /// Per-host locks held while a leaf is being forged.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    leaves_issued: AtomicU64,
}

impl CertificateAuthority {
    /// Create an authority signing with `anchor`.
    ///
    /// Pass `None` as `cache` to forge on every request.
    pub fn new(anchor: Arc<RootTrustAnchor>, cache: Option<Arc<dyn CertificateCache>>) -> Self {
        Self {
            forge: LeafForge::new(anchor),
            cache,
            in_flight: Mutex::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            leaves_issued: AtomicU64::new(0),
        }
    }

    /// Server configuration presenting a leaf for `host`.
    ///
    /// `host` may carry a port; the bare host is used for lookup and subject.
    pub fn server_config(&self, host: &str) -> AuthorityResult<Arc<ServerConfig>> {
        self.leaf(host)?.server_config()
    }

    /// Leaf certificate for `host`, from cache or freshly forged.
    pub fn leaf(&self, host: &str) -> AuthorityResult<Arc<LeafCertificate>> {
        let host = HostIdentity::parse(host)?;

        let Some(cache) = &self.cache else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
            return self.forge_leaf(&host);
        };

        if let Some(hit) = self.cached(cache.as_ref(), &host) {
            return Ok(hit);
        }

        let lock = self.host_lock(host.as_str());
        let result = {
            let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

            // Another caller may have finished while we waited
            match self.cached(cache.as_ref(), &host) {
                Some(hit) => Ok(hit),
                None => {
                    self.cache_misses.fetch_add(1, Ordering::Relaxed);
                    self.forge_leaf(&host).inspect(|leaf| {
                        cache.set(host.as_str(), leaf.clone());
                    })
                }
            }
        };
        self.release_host_lock(host.as_str(), lock);

        result
    }

    /// The root this authority signs with.
    pub fn anchor(&self) -> &Arc<RootTrustAnchor> {
        self.forge.anchor()
    }

    /// Root certificate, PEM.
    pub fn root_ca_pem(&self) -> &str {
        self.anchor().cert_pem()
    }

    /// The configured cache, if any.
    pub fn cache(&self) -> Option<&Arc<dyn CertificateCache>> {
        self.cache.as_ref()
    }

    /// Current counters.
    pub fn stats(&self) -> AuthorityStats {
        AuthorityStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            leaves_issued: self.leaves_issued.load(Ordering::Relaxed),
        }
    }

    fn cached(&self, cache: &dyn CertificateCache, host: &HostIdentity) -> Option<Arc<LeafCertificate>> {
        let hit = cache.get(host.as_str())?;
        trace!("Certificate cache hit for {}", host);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        Some(hit)
    }

    fn forge_leaf(&self, host: &HostIdentity) -> AuthorityResult<Arc<LeafCertificate>> {
        let forged = self.forge.generate_for(host)?;
        let leaf = LeafCertificate::from_pem(host.as_str(), &forged)?;
        self.leaves_issued.fetch_add(1, Ordering::Relaxed);
        debug!("Issued leaf certificate for {}", host);
        Ok(Arc::new(leaf))
    }

    fn host_lock(&self, host: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.entry(host.to_string()).or_default().clone()
    }

    fn release_host_lock(&self, host: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        // Drop our clone under the map lock so the count below is exact
        drop(lock);
        if in_flight
            .get(host)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            in_flight.remove(host);
        }
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("anchor", self.anchor())
            .field("cached", &self.cache.as_ref().map(|c| c.len()))
            .field("stats", &self.stats())
            .finish()
    }
}
