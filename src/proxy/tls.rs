//! TLS plumbing for the intercepting proxy.
//!
//! This module provides:
//! - Per-host server configuration from the certificate authority, forged on
//!   the blocking pool so RSA key generation never stalls the runtime
//! - TLS connector for upstream connections (proxy as client)
//! - Server name conversion for upstream handshakes
//!
//! # Example
//!
//! ```ignore
//! use sluice::proxy::tls::{create_tls_connector, forged_server_config};
//!
//! // For accepting the client side of a tunnel
//! let config = forged_server_config(&authority, "example.com:443").await?;
//! let acceptor = tokio_rustls::TlsAcceptor::from(config);
//!
//! // For connecting to upstream servers
//! let connector = create_tls_connector();
//! ```

use super::error::ProxyError;
use crate::authority::CertificateAuthority;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::ServerName;
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Server configuration presenting a forged leaf for `host`.
///
/// Forging happens on the blocking pool. A failure affects only the caller.
pub async fn forged_server_config(
    authority: &Arc<CertificateAuthority>,
    host: &str,
) -> Result<Arc<ServerConfig>, ProxyError> {
    let authority = authority.clone();
    let host = host.to_string();
    let config = tokio::task::spawn_blocking(move || authority.server_config(&host)).await??;
    Ok(config)
}

/// Create a TLS connector for upstream connections.
///
/// The proxy acts as a client and verifies the upstream certificate against
/// the system root CAs. An empty store is not an error here: every upstream
/// handshake will simply fail verification, which is reported per tunnel.
pub fn create_tls_connector() -> TlsConnector {
    let mut root_store = RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();

    // Log any errors but continue with successfully loaded certs
    for err in native_certs.errors {
        debug!("Warning loading native cert: {}", err);
    }

    for cert in native_certs.certs {
        if let Err(e) = root_store.add(cert) {
            debug!("Warning adding cert to store: {}", e);
        }
    }

    if root_store.is_empty() {
        warn!("No system root certificates found; upstream TLS will fail verification");
    } else {
        debug!("Loaded {} root certificates", root_store.len());
    }

    connector_with_roots(root_store)
}

/// Create an upstream connector trusting exactly `roots`.
pub fn connector_with_roots(roots: RootCertStore) -> TlsConnector {
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    // The relay copies bytes; keep the upstream on HTTP/1.1 as well
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    TlsConnector::from(Arc::new(config))
}

/// Convert a host (DNS name or IP literal) to a rustls server name.
pub fn domain_to_server_name(domain: &str) -> Result<ServerName<'static>, ProxyError> {
    ServerName::try_from(domain.to_string())
        .map_err(|_| ProxyError::Tls(format!("Invalid server name: {}", domain)))
}
