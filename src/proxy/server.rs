//! HTTP proxy server implementation.
//!
//! This module provides the listener that:
//! - Binds the configured TCP address and publishes the bound address
//! - Serves each accepted connection on its own task (hyper HTTP/1.1 with
//!   upgrade support for CONNECT)
//! - Drains in-flight connections on shutdown within a bounded grace period
//!
//! # Shutdown
//!
//! Cancelling the token passed to [`ProxyServer::serve`] stops the accept
//! loop. Every connection is asked to finish its current request (hyper
//! graceful shutdown) and open tunnels keep relaying. Whatever is still
//! running when the grace period ends is closed. Exceeding the grace period
//! is logged, never escalated.
//!
//! When `serve` returns, the [`ProxyServer::stopped`] marker flips to `true`.
//!
//! # Example
//!
//! ```ignore
//! use sluice::proxy::{ProxyConfig, ProxyServer};
//! use tokio_util::sync::CancellationToken;
//!
//! let server = ProxyServer::new(ProxyConfig::default(), authority);
//! let mut stopped = server.stopped();
//!
//! let shutdown = CancellationToken::new();
//! let handle = tokio::spawn(server.serve(shutdown.clone()));
//!
//! // To shutdown:
//! shutdown.cancel();
//! stopped.wait_for(|s| *s).await?;
//! ```

use super::connect::{ProxyBody, TunnelContext, handle_connect, handle_other};
use super::error::{ProxyError, ProxyResult};
use super::tls::create_tls_connector;
use crate::authority::CertificateAuthority;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Default graceful drain budget.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the proxy server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Address to listen on. Port 0 picks an ephemeral port.
    pub listen_addr: SocketAddr,
    /// Budget for reading a request head and for the client TLS handshake.
    pub read_timeout: Duration,
    /// Budget for the upstream connect and upstream TLS handshake.
    pub write_timeout: Duration,
    /// How long in-flight connections may run after shutdown starts.
    pub shutdown_grace: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// The intercepting proxy listener.
pub struct ProxyServer {
    config: ProxyConfig,
    /// Certificate authority for TLS interception.
    authority: Arc<CertificateAuthority>,
    /// Upstream connector; system roots are loaded at serve time when unset.
    connector: Option<TlsConnector>,
    /// Bound address, published once the socket is bound.
    local_addr: watch::Sender<Option<SocketAddr>>,
    /// One-shot completion marker.
    stopped: watch::Sender<bool>,
}

impl ProxyServer {
    /// Create a new proxy server.
    ///
    /// # Arguments
    ///
    /// * `config` - Listener configuration.
    /// * `authority` - Source of forged per-host TLS configurations.
    pub fn new(config: ProxyConfig, authority: Arc<CertificateAuthority>) -> Self {
        let (local_addr, _) = watch::channel(None);
        let (stopped, _) = watch::channel(false);

        Self {
            config,
            authority,
            connector: None,
            local_addr,
            stopped,
        }
    }

    /// Use `connector` for upstream TLS instead of the system roots.
    pub fn with_upstream_connector(mut self, connector: TlsConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Listener configuration.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The certificate authority behind this listener.
    pub fn authority(&self) -> &Arc<CertificateAuthority> {
        &self.authority
    }

    /// Receiver for the bound address (`None` until bound).
    pub fn local_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.local_addr.subscribe()
    }

    /// Receiver that turns `true` once [`serve`](Self::serve) has returned.
    pub fn stopped(&self) -> watch::Receiver<bool> {
        self.stopped.subscribe()
    }

    /// Run the proxy server until `shutdown` is cancelled.
    ///
    /// Returns after the drain completes. A bind failure is returned as an
    /// error; accept failures are logged and the loop continues.
    pub async fn serve(self, shutdown: CancellationToken) -> ProxyResult<()> {
        let result = self.run_listener(&shutdown).await;

        match &result {
            Ok(()) => info!("Proxy stopped"),
            Err(e) => error!("Proxy listener failed: {}", e),
        }
        self.stopped.send_replace(true);

        result
    }

    async fn run_listener(&self, shutdown: &CancellationToken) -> ProxyResult<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;

        let bound = listener.local_addr()?;
        self.local_addr.send_replace(Some(bound));
        info!("Proxy listening on {}", bound);

        let ctx = TunnelContext {
            authority: self.authority.clone(),
            connector: self.connector.clone().unwrap_or_else(create_tls_connector),
            read_timeout: self.config.read_timeout,
            write_timeout: self.config.write_timeout,
            tasks: TaskTracker::new(),
            hard_stop: CancellationToken::new(),
        };

        // Accept loop
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Proxy shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            self.spawn_connection_handler(stream, peer, &ctx, shutdown);
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        drop(listener);
        self.drain(&ctx).await;

        Ok(())
    }

    /// Spawn a task to handle a single connection.
    fn spawn_connection_handler(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        ctx: &TunnelContext,
        shutdown: &CancellationToken,
    ) {
        let span = info_span!("conn", id = %Uuid::new_v4(), %peer);
        let tasks = ctx.tasks.clone();
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();

        tasks.spawn(
            async move {
                debug!("Accepted connection");
                if let Err(e) = handle_connection(stream, ctx, shutdown).await {
                    if e.is_disconnect() {
                        debug!("Connection ended: {}", e);
                    } else {
                        warn!("Connection error: {}", e);
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Wait for tracked connections and tunnels, up to the grace budget.
    async fn drain(&self, ctx: &TunnelContext) {
        ctx.tasks.close();
        if ctx.tasks.is_empty() {
            return;
        }

        let grace = self.config.shutdown_grace;
        info!("Draining {} in-flight tasks (grace {:?})", ctx.tasks.len(), grace);

        if tokio::time::timeout(grace, ctx.tasks.wait()).await.is_err() {
            warn!(
                "Graceful drain exceeded {:?}; closing {} remaining tasks",
                grace,
                ctx.tasks.len()
            );
            ctx.hard_stop.cancel();
            ctx.tasks.wait().await;
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: TcpStream,
    ctx: TunnelContext,
    shutdown: CancellationToken,
) -> ProxyResult<()> {
    let io = TokioIo::new(stream);
    let read_timeout = ctx.read_timeout;
    let hard_stop = ctx.hard_stop.clone();

    // Create the service that handles each request
    let service = service_fn(move |req: Request<Incoming>| {
        let ctx = ctx.clone();
        async move { proxy_request(req, ctx).await }
    });

    // Serve HTTP/1.1 with support for upgrades (needed for CONNECT)
    let conn = http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout)
        .serve_connection(io, service)
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => return result.map_err(ProxyError::from),
        _ = shutdown.cancelled() => {}
    }

    conn.as_mut().graceful_shutdown();

    tokio::select! {
        result = conn.as_mut() => result.map_err(ProxyError::from),
        _ = hard_stop.cancelled() => Ok(()),
    }
}

/// Process a single proxy request.
async fn proxy_request(
    req: Request<Incoming>,
    ctx: TunnelContext,
) -> ProxyResult<Response<ProxyBody>> {
    if req.method() == Method::CONNECT {
        handle_connect(req, ctx).await
    } else {
        Ok(handle_other(&req))
    }
}
