//! Host identity normalization.
//!
//! Connections name their target as `host`, `host:port`, `[v6]` or
//! `[v6]:port`. Certificates and cache entries are always keyed by the bare
//! host: no port, no brackets, DNS names lowercased.

use super::error::{AuthorityError, AuthorityResult};
use std::net::IpAddr;

/// Bare host used as the certificate subject and cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostIdentity {
    host: String,
    ip: Option<IpAddr>,
}

impl HostIdentity {
    /// Normalize a host string, stripping any port suffix.
    pub fn parse(raw: &str) -> AuthorityResult<Self> {
        let bare = strip_port(raw.trim());
        let bare = bare.strip_suffix('.').filter(|s| !s.is_empty()).unwrap_or(bare);

        if bare.is_empty() {
            return Err(AuthorityError::InvalidHost(raw.to_string()));
        }

        match bare.parse::<IpAddr>() {
            Ok(ip) => Ok(Self {
                host: ip.to_string(),
                ip: Some(ip),
            }),
            Err(_) => {
                if bare.contains(|c: char| c.is_whitespace() || c == '/' || c == '[' || c == ']') {
                    return Err(AuthorityError::InvalidHost(raw.to_string()));
                }
                Ok(Self {
                    host: bare.to_ascii_lowercase(),
                    ip: None,
                })
            }
        }
    }

    /// The bare host string.
    pub fn as_str(&self) -> &str {
        &self.host
    }

    /// The IP address, if the host is an IP literal.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }
}

impl std::fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.host)
    }
}

/// Strip a trailing `:port` and IPv6 brackets.
///
/// A bare IPv6 literal (several colons, no brackets) is returned as is.
fn strip_port(raw: &str) -> &str {
    if let Some(rest) = raw.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => raw,
        };
    }

    match raw.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_port() {
        let host = HostIdentity::parse("example.com:8443").unwrap();
        assert_eq!(host.as_str(), "example.com");
        assert!(host.ip().is_none());
    }

    #[test]
    fn test_plain_host_unchanged() {
        assert_eq!(HostIdentity::parse("api.example.com").unwrap().as_str(), "api.example.com");
    }

    #[test]
    fn test_lowercases_dns_names() {
        assert_eq!(HostIdentity::parse("Example.COM").unwrap().as_str(), "example.com");
    }

    #[test]
    fn test_trailing_dot_removed() {
        assert_eq!(HostIdentity::parse("example.com.").unwrap().as_str(), "example.com");
    }

    #[test]
    fn test_ipv4_with_port() {
        let host = HostIdentity::parse("10.0.0.1:443").unwrap();
        assert_eq!(host.as_str(), "10.0.0.1");
        assert_eq!(host.ip(), Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_bracketed_ipv6_with_port() {
        let host = HostIdentity::parse("[::1]:8443").unwrap();
        assert_eq!(host.as_str(), "::1");
        assert!(host.ip().is_some());
    }

    #[test]
    fn test_bare_ipv6() {
        let host = HostIdentity::parse("2001:db8::1").unwrap();
        assert_eq!(host.as_str(), "2001:db8::1");
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(matches!(HostIdentity::parse(""), Err(AuthorityError::InvalidHost(_))));
        assert!(matches!(HostIdentity::parse(":443"), Err(AuthorityError::InvalidHost(_))));
        assert!(matches!(HostIdentity::parse("[]:443"), Err(AuthorityError::InvalidHost(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(HostIdentity::parse("exa mple.com").is_err());
        assert!(HostIdentity::parse("example.com/path").is_err());
    }
}
