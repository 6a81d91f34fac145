//! Error types for proxy operations.
//!
//! This module defines structured error types for the intercepting listener:
//! - Server errors (bind, accept)
//! - TLS errors (upstream connector, handshakes)
//! - Connection errors (upstream connect, relay)
//! - Certificate errors surfaced from the authority for one host

use crate::authority::AuthorityError;
use std::net::SocketAddr;
use thiserror::Error;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        /// The address we tried to bind to.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error (socket operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Invalid CONNECT request.
    #[error("Invalid CONNECT request: {0}")]
    InvalidConnect(String),

    /// TLS error during handshake or configuration.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The authority could not produce a certificate for the host.
    #[error("Certificate error: {0}")]
    Authority(#[from] AuthorityError),

    /// Connection timeout.
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// Failed to connect to upstream server.
    #[error("Failed to connect to upstream '{addr}': {message}")]
    UpstreamConnect {
        /// The address we tried to connect to.
        addr: String,
        /// Error message.
        message: String,
    },

    /// A blocking or spawned task did not complete.
    #[error("Task failed: {0}")]
    Task(String),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl From<rustls::Error> for ProxyError {
    fn from(err: rustls::Error) -> Self {
        ProxyError::Tls(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ProxyError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProxyError::Task(err.to_string())
    }
}

impl ProxyError {
    /// Whether this is a routine peer disconnect rather than a fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProxyError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            ProxyError::Http(e) => e.is_incomplete_message() || e.is_canceled(),
            _ => false,
        }
    }
}
