//! Certificate authority for TLS interception.
//!
//! The authority holds one long-lived root trust anchor and forges a leaf
//! certificate per intercepted host, signed by that root. Clients that trust
//! the root accept the forged leaves.
//!
//! # Components
//!
//! - [`RootTrustAnchor`]: the root certificate and key, embedded or loaded
//!   from PEM files. Parsed once at startup.
//! - [`LeafForge`]: generates an RSA-2048 key pair and signs a leaf for one
//!   host.
//! - [`CertificateCache`]: pluggable host-keyed store, with [`MemoryCache`]
//!   and [`BoundedCache`] provided.
//! - [`CertificateAuthority`]: ties the three together and hands out
//!   `rustls::ServerConfig`s, collapsing concurrent requests for one host.
//!
//! # Example
//!
//! ```ignore
//! use sluice::authority::{CertificateAuthority, MemoryCache, RootTrustAnchor};
//! use std::sync::Arc;
//!
//! let anchor = Arc::new(RootTrustAnchor::embedded()?);
//! let authority = CertificateAuthority::new(anchor, Some(Arc::new(MemoryCache::new())));
//!
//! let config = authority.server_config("example.com:443")?;
//! ```

pub mod anchor;
pub mod assembler;
pub mod cache;
pub mod error;
pub mod forge;
pub mod host;

pub use anchor::{RootTrustAnchor, root_ca_pem};
pub use assembler::{AuthorityStats, CertificateAuthority, LeafCertificate};
pub use cache::{BoundedCache, CertificateCache, MemoryCache};
pub use error::{AuthorityError, AuthorityResult};
pub use forge::{ForgedPem, LeafForge, serial_for_host};
pub use host::HostIdentity;
