//! Configuration schema definitions.
//!
//! This module defines the structure of the sluice configuration files.
//! Every scalar is optional in a single file; layers are merged and a later
//! layer overrides any value it sets. The embedded defaults set everything,
//! so a merged configuration is complete.

use super::error::ConfigError;
use crate::authority::{
    AuthorityResult, BoundedCache, CertificateCache, MemoryCache, RootTrustAnchor,
};
use crate::proxy::ProxyConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Certificate authority settings.
    #[serde(default)]
    pub certificates: CertificatesConfig,
}

impl Config {
    /// Merge another config into this one.
    ///
    /// Scalars set in `other` override the current values.
    pub fn merge(&mut self, other: Config) {
        self.general.merge(other.general);
        self.server.merge(other.server);
        self.certificates.merge(other.certificates);
    }

    /// Check merged values for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.shutdown_grace_secs == Some(0) {
            return Err(ConfigError::invalid(
                "server.shutdown_grace_secs",
                "must be greater than zero",
            ));
        }

        for (field, value) in [
            ("server.read_timeout_secs", self.server.read_timeout_secs),
            ("server.write_timeout_secs", self.server.write_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        if self.certificates.cache == Some(CacheKind::Bounded)
            && self.certificates.cache_capacity == Some(0)
        {
            return Err(ConfigError::invalid(
                "certificates.cache_capacity",
                "a bounded cache needs a capacity above zero",
            ));
        }

        match (
            &self.certificates.root_cert_path,
            &self.certificates.root_key_path,
        ) {
            (Some(_), None) => Err(ConfigError::invalid(
                "certificates.root_key_path",
                "required when root_cert_path is set",
            )),
            (None, Some(_)) => Err(ConfigError::invalid(
                "certificates.root_cert_path",
                "required when root_key_path is set",
            )),
            _ => Ok(()),
        }
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Listener configuration derived from `[server]`.
    pub fn proxy_config(&self) -> ProxyConfig {
        let defaults = ProxyConfig::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        ProxyConfig {
            listen_addr: self.server.listen_addr.unwrap_or(defaults.listen_addr),
            read_timeout: secs(self.server.read_timeout_secs, defaults.read_timeout),
            write_timeout: secs(self.server.write_timeout_secs, defaults.write_timeout),
            shutdown_grace: secs(self.server.shutdown_grace_secs, defaults.shutdown_grace),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub log_level: String,
}

impl GeneralConfig {
    fn merge(&mut self, other: GeneralConfig) {
        if !other.log_level.is_empty() {
            self.log_level = other.log_level;
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<SocketAddr>,

    /// Request head read and client TLS handshake budget, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,

    /// Upstream connect and TLS handshake budget, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_secs: Option<u64>,

    /// Graceful drain budget on shutdown, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_secs: Option<u64>,
}

impl ServerConfig {
    fn merge(&mut self, other: ServerConfig) {
        if other.listen_addr.is_some() {
            self.listen_addr = other.listen_addr;
        }
        if other.read_timeout_secs.is_some() {
            self.read_timeout_secs = other.read_timeout_secs;
        }
        if other.write_timeout_secs.is_some() {
            self.write_timeout_secs = other.write_timeout_secs;
        }
        if other.shutdown_grace_secs.is_some() {
            self.shutdown_grace_secs = other.shutdown_grace_secs;
        }
    }
}

/// Certificate cache strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Unbounded in-memory cache.
    Memory,
    /// In-memory cache with LRU eviction at `cache_capacity`.
    Bounded,
    /// Forge on every request.
    None,
}

/// Certificate authority settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CertificatesConfig {
    /// Cache strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheKind>,

    /// Entry limit for the bounded cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,

    /// PEM root certificate replacing the embedded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cert_path: Option<PathBuf>,

    /// PEM private key for `root_cert_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_key_path: Option<PathBuf>,
}

impl CertificatesConfig {
    fn merge(&mut self, other: CertificatesConfig) {
        if other.cache.is_some() {
            self.cache = other.cache;
        }
        if other.cache_capacity.is_some() {
            self.cache_capacity = other.cache_capacity;
        }
        // The root pair is overridden as a unit
        if other.root_cert_path.is_some() || other.root_key_path.is_some() {
            self.root_cert_path = other.root_cert_path;
            self.root_key_path = other.root_key_path;
        }
    }

    /// Build the configured cache; `None` means no caching.
    pub fn build_cache(&self) -> Option<Arc<dyn CertificateCache>> {
        match self.cache.unwrap_or(CacheKind::Memory) {
            CacheKind::Memory => Some(Arc::new(MemoryCache::new())),
            CacheKind::Bounded => Some(Arc::new(BoundedCache::new(
                self.cache_capacity.unwrap_or(1024),
            ))),
            CacheKind::None => None,
        }
    }

    /// Load the root trust anchor: the configured files, or the embedded root.
    pub fn load_anchor(&self) -> AuthorityResult<RootTrustAnchor> {
        match (&self.root_cert_path, &self.root_key_path) {
            (Some(cert), Some(key)) => RootTrustAnchor::from_pem_files(cert, key),
            _ => RootTrustAnchor::embedded(),
        }
    }
}
