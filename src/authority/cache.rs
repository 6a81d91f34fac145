//! Certificate cache capability.
//!
//! The assembler consults a [`CertificateCache`] before forging and fills it
//! afterwards. The trait is all the authority depends on, so callers can plug
//! in any store; two in-process implementations are provided:
//!
//! - [`MemoryCache`]: unbounded map, entries live for the process lifetime.
//! - [`BoundedCache`]: fixed capacity, least recently used entry evicted.
//!
//! Running without a cache is expressed as `None` at the assembler.
//!
//! Implementations must give read-your-write visibility within one process.

use super::assembler::LeafCertificate;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

/// Host-keyed store of forged leaf certificates.
pub trait CertificateCache: Send + Sync {
    /// Look up the certificate stored for a bare host.
    fn get(&self, host: &str) -> Option<Arc<LeafCertificate>>;

    /// Store a certificate under a bare host, replacing any previous entry.
    fn set(&self, host: &str, cert: Arc<LeafCertificate>);

    /// Number of stored certificates.
    fn len(&self) -> usize;

    /// Whether the cache holds nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored certificate.
    fn clear(&self);
}

/// Unbounded in-memory cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Arc<LeafCertificate>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CertificateCache for MemoryCache {
    fn get(&self, host: &str) -> Option<Arc<LeafCertificate>> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        let hit = entries.get(host).cloned();
        trace!(host, hit = hit.is_some(), "Memory cache lookup");
        hit
    }

    fn set(&self, host: &str, cert: Arc<LeafCertificate>) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(host.to_string(), cert);
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn clear(&self) {
        self.entries.write().unwrap_or_else(|p| p.into_inner()).clear();
        debug!("Certificate cache cleared");
    }
}

/// Cache holding at most `capacity` entries, evicting the least recently used.
pub struct BoundedCache {
    capacity: usize,
    state: Mutex<BoundedState>,
}

#[derive(Default)]
struct BoundedState {
    entries: HashMap<String, Arc<LeafCertificate>>,
    /// Front is least recently used.
    recency: VecDeque<String>,
}

impl BoundedState {
    fn touch(&mut self, host: &str) {
        if let Some(position) = self.recency.iter().position(|h| h == host) {
            self.recency.remove(position);
        }
        self.recency.push_back(host.to_string());
    }
}

impl BoundedCache {
    /// Create a cache holding at most `capacity` certificates.
    ///
    /// A capacity of zero stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BoundedState::default()),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl CertificateCache for BoundedCache {
    fn get(&self, host: &str) -> Option<Arc<LeafCertificate>> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let hit = state.entries.get(host).cloned();
        if hit.is_some() {
            state.touch(host);
        }
        hit
    }

    fn set(&self, host: &str, cert: Arc<LeafCertificate>) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !state.entries.contains_key(host) && state.entries.len() >= self.capacity {
            if let Some(oldest) = state.recency.pop_front() {
                debug!("Evicting cached certificate for {}", oldest);
                state.entries.remove(&oldest);
            }
        }
        state.entries.insert(host.to_string(), cert);
        state.touch(host);
    }

    fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).entries.len()
    }

    fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.entries.clear();
        state.recency.clear();
    }
}
