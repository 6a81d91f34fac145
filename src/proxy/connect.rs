//! HTTP CONNECT method handling for HTTPS interception.
//!
//! Clients reach HTTPS destinations through the proxy with CONNECT. The flow is:
//!
//! 1. Client sends: `CONNECT api.example.com:443 HTTP/1.1`
//! 2. Proxy returns `200 Connection Established` and upgrades to a tunnel
//! 3. Proxy connects to the upstream server with real TLS
//! 4. Proxy accepts TLS from the client using a leaf forged for the host
//! 5. Bytes are relayed in both directions until either side closes
//!
//! Any other method is answered with `405 Method Not Allowed`.
//!
//! A tunnel whose certificate cannot be forged, or whose upstream is
//! unreachable, closes on its own. Other connections are unaffected.

use super::error::{ProxyError, ProxyResult};
use super::tls::{domain_to_server_name, forged_server_config};
use crate::authority::CertificateAuthority;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use hyper::body::Incoming;
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::upgrade::Upgraded;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, info, warn};

/// Response body type used by the proxy.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Shared state every tunnel needs.
#[derive(Clone)]
pub struct TunnelContext {
    /// Source of per-host server configurations.
    pub authority: Arc<CertificateAuthority>,
    /// Connector for the upstream side.
    pub connector: TlsConnector,
    /// Budget for the downstream TLS handshake.
    pub read_timeout: Duration,
    /// Budget for upstream connect and TLS handshake.
    pub write_timeout: Duration,
    /// Tracks tunnel tasks so the server can wait for them on shutdown.
    pub tasks: TaskTracker,
    /// Cancelled when the drain budget runs out.
    pub hard_stop: CancellationToken,
}

/// Handle HTTP CONNECT request for HTTPS tunneling.
///
/// Returns `200` and spawns the tunnel onto the context's task tracker. The
/// tunnel starts once hyper hands over the upgraded connection.
///
/// # Arguments
///
/// * `req` - The HTTP CONNECT request.
/// * `ctx` - Authority, upstream connector and timeouts.
pub async fn handle_connect(
    req: Request<Incoming>,
    ctx: TunnelContext,
) -> ProxyResult<Response<ProxyBody>> {
    let Some(target) = req.uri().authority().map(|a| a.to_string()) else {
        return Ok(bad_request_response("Missing authority in CONNECT request"));
    };

    let (host, port) = match parse_host_port(&target) {
        Ok(parsed) => parsed,
        Err(e) => return Ok(bad_request_response(&e.to_string())),
    };

    debug!("CONNECT request to {}:{}", host, port);

    let tasks = ctx.tasks.clone();
    tasks.spawn(
        async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    let result = tokio::select! {
                        result = tunnel_connection(upgraded, &host, port, &ctx) => result,
                        _ = ctx.hard_stop.cancelled() => {
                            debug!("Tunnel to {}:{} aborted at end of drain", host, port);
                            Ok(())
                        }
                    };
                    match result {
                        Ok(()) => {}
                        Err(e) if e.is_disconnect() => debug!("Tunnel ended for {}:{}: {}", host, port, e),
                        Err(e) => warn!("Tunnel failed for {}:{}: {}", host, port, e),
                    }
                }
                Err(e) => {
                    warn!("HTTP upgrade failed for {}:{}: {}", host, port, e);
                }
            }
        }
        .instrument(Span::current()),
    );

    // Return 200 Connection Established to initiate the upgrade
    Ok(status_response(StatusCode::OK))
}

/// Answer a non-CONNECT request.
pub fn handle_other(req: &Request<Incoming>) -> Response<ProxyBody> {
    debug!("Rejecting {} {}", req.method(), req.uri());

    let mut response = text_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "Only CONNECT is supported by this proxy",
    );
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("CONNECT"));
    response
}

/// Run one tunnel after the HTTP upgrade.
///
/// 1. Connect to upstream (fail fast if unreachable)
/// 2. TLS handshake with upstream
/// 3. Accept TLS from the client with the forged leaf
/// 4. Relay both directions
async fn tunnel_connection(
    upgraded: Upgraded,
    host: &str,
    port: u16,
    ctx: &TunnelContext,
) -> ProxyResult<()> {
    let upstream_addr = upstream_authority(host, port);

    let upstream = timeout(ctx.write_timeout, TcpStream::connect(&upstream_addr))
        .await
        .map_err(|_| ProxyError::Timeout("upstream connect"))?
        .map_err(|e| ProxyError::UpstreamConnect {
            addr: upstream_addr.clone(),
            message: e.to_string(),
        })?;

    debug!("Connected to upstream {}", upstream_addr);

    let server_name = domain_to_server_name(host)?;
    let mut upstream_tls = timeout(ctx.write_timeout, ctx.connector.connect(server_name, upstream))
        .await
        .map_err(|_| ProxyError::Timeout("upstream TLS handshake"))?
        .map_err(|e| ProxyError::Tls(format!("Upstream TLS handshake failed: {}", e)))?;

    let server_config = forged_server_config(&ctx.authority, host).await?;
    let acceptor = TlsAcceptor::from(server_config);

    let mut client_tls = timeout(ctx.read_timeout, acceptor.accept(TokioIo::new(upgraded)))
        .await
        .map_err(|_| ProxyError::Timeout("client TLS handshake"))?
        .map_err(|e| ProxyError::Tls(format!("Client TLS handshake failed: {}", e)))?;

    info!("Intercepting {}:{}", host, port);

    let (to_upstream, to_client) =
        tokio::io::copy_bidirectional(&mut client_tls, &mut upstream_tls).await?;

    debug!(
        to_upstream,
        to_client, "Tunnel closed for {}:{}", host, port
    );
    Ok(())
}

/// Parse host:port string from CONNECT authority.
///
/// Examples:
/// - `api.example.com:443` -> ("api.example.com", 443)
/// - `api.example.com` -> ("api.example.com", 443) (default port)
/// - `[::1]:8443` -> ("::1", 8443)
pub fn parse_host_port(authority: &str) -> ProxyResult<(String, u16)> {
    let (host, port_str) = match authority.strip_prefix('[') {
        Some(rest) => {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                ProxyError::InvalidConnect(format!("Unterminated IPv6 literal: {}", authority))
            })?;
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(ProxyError::InvalidConnect(format!(
                            "Unexpected text after IPv6 literal: {}",
                            authority
                        )));
                    }
                },
            }
        }
        None => match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        },
    };

    if host.is_empty() {
        return Err(ProxyError::InvalidConnect(format!(
            "Missing host in {:?}",
            authority
        )));
    }

    // No port specified - default to 443 for CONNECT
    let port = match port_str {
        Some(port_str) => port_str
            .parse::<u16>()
            .map_err(|_| ProxyError::InvalidConnect(format!("Invalid port: {}", port_str)))?,
        None => 443,
    };

    Ok((host.to_string(), port))
}

/// `host:port` for dialing, bracketing IPv6 literals.
fn upstream_authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Create an empty response body.
fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Create a response body with content.
fn full_body(content: String) -> ProxyBody {
    Full::new(Bytes::from(content))
        .map_err(|never| match never {})
        .boxed()
}

fn status_response(status: StatusCode) -> Response<ProxyBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = status;
    response
}

fn text_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(message.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// Create a 400 Bad Request response.
fn bad_request_response(message: &str) -> Response<ProxyBody> {
    text_response(StatusCode::BAD_REQUEST, message)
}
