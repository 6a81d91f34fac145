//! Intercepting network listener.
//!
//! This module provides the listener the lifecycle coordinator drives:
//! - HTTP CONNECT handling for HTTPS tunneling
//! - TLS termination with a leaf forged per destination host
//! - Upstream TLS with system (or injected) roots
//! - Graceful drain with a bounded grace period
//!
//! # Architecture
//!
//! ```text
//!   client ──CONNECT host:443──▶ ProxyServer ──TLS (forged leaf)──┐
//!                                    │                            │
//!                                    │ server_config(host)        │ relay
//!                                    ▼                            ▼
//!                           CertificateAuthority          upstream host:443
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sluice::proxy::{ProxyConfig, ProxyServer};
//! use tokio_util::sync::CancellationToken;
//!
//! let server = ProxyServer::new(ProxyConfig::default(), authority);
//! let shutdown = CancellationToken::new();
//! server.serve(shutdown).await?;
//! ```

pub mod connect;
pub mod error;
pub mod server;
pub mod tls;

// Re-export main types for convenient access
pub use error::{ProxyError, ProxyResult};
pub use server::{DEFAULT_SHUTDOWN_GRACE, ProxyConfig, ProxyServer};
