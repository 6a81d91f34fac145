//! Error types for certificate authority operations.
//!
//! Two classes of failure live here:
//! - Anchor errors (root certificate or key unusable). These are fatal at
//!   startup; nothing can be served without a signing root.
//! - Per-host errors (key generation, signing, TLS config assembly). These
//!   fail the single request that asked for the certificate.

use thiserror::Error;

/// Unified error type for certificate authority operations.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The root certificate PEM could not be decoded or parsed.
    #[error("Failed to parse root certificate: {0}")]
    AnchorCertificate(String),

    /// The root private key PEM could not be decoded or parsed.
    #[error("Failed to parse root private key: {0}")]
    AnchorKey(String),

    /// The root key does not belong to the root certificate.
    #[error("Root private key does not match the root certificate public key")]
    AnchorKeyMismatch,

    /// The root certificate is not marked as a certificate authority.
    #[error("Root certificate is not a CA certificate")]
    AnchorNotCa,

    /// Failed to read root material from disk.
    #[error("Failed to read root material from {path}: {source}")]
    ReadFile {
        /// The file that could not be read.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Host string is empty or otherwise unusable as a certificate subject.
    #[error("Invalid host for certificate: {0:?}")]
    InvalidHost(String),

    /// Failed to generate the leaf key pair.
    #[error("Failed to generate key pair: {0}")]
    KeyGeneration(String),

    /// Failed to re-encode the leaf key for output.
    #[error("Failed to encode private key: {0}")]
    KeyEncoding(String),

    /// Failed to sign the leaf certificate with the root key.
    #[error("Failed to sign certificate: {0}")]
    Signing(String),

    /// Forged PEM material could not be decoded back into DER.
    #[error("Failed to decode forged PEM: {0}")]
    Pem(String),

    /// rustls rejected the certificate or key when building a server config.
    #[error("Failed to build TLS configuration: {0}")]
    TlsConfig(#[from] rustls::Error),
}

/// Result type for certificate authority operations.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

impl AuthorityError {
    /// Whether this error is about the root material rather than a single host.
    pub fn is_anchor_error(&self) -> bool {
        matches!(
            self,
            AuthorityError::AnchorCertificate(_)
                | AuthorityError::AnchorKey(_)
                | AuthorityError::AnchorKeyMismatch
                | AuthorityError::AnchorNotCa
                | AuthorityError::ReadFile { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation_error_display() {
        let err = AuthorityError::KeyGeneration("rng failure".to_string());
        assert!(err.to_string().contains("rng failure"));
    }

    #[test]
    fn test_invalid_host_display() {
        let err = AuthorityError::InvalidHost(String::new());
        assert!(err.to_string().contains("Invalid host"));
    }

    #[test]
    fn test_anchor_classification() {
        assert!(AuthorityError::AnchorKeyMismatch.is_anchor_error());
        assert!(AuthorityError::AnchorCertificate("bad".into()).is_anchor_error());
        assert!(!AuthorityError::Signing("bad".into()).is_anchor_error());
        assert!(!AuthorityError::InvalidHost("".into()).is_anchor_error());
    }
}
