//! Shutdown triggers.
//!
//! Three sources feed one trigger stream:
//! - OS signals: interrupt, terminate, hang-up, quit (Unix); Ctrl+C elsewhere
//! - Programmatic requests through a [`ShutdownHandle`]
//! - An optional external [`CancellationToken`]
//!
//! The coordinator does not care which source fired. The first trigger
//! starts a graceful shutdown; the next one, from any source, forces exit.
//! A cancellation token fires at most once.

use std::fmt;
use std::future::pending;
use std::io;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Process signals that request shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Interrupt signal (Ctrl+C, SIGINT).
    Interrupt,
    /// Termination signal (SIGTERM).
    Terminate,
    /// Hangup signal (SIGHUP).
    Hangup,
    /// Quit signal (SIGQUIT).
    Quit,
}

impl ShutdownSignal {
    /// Conventional signal name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
        }
    }
}

/// What started (or escalated) a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// An OS signal was delivered.
    Signal(ShutdownSignal),
    /// [`ShutdownHandle::request`] was called.
    Requested,
    /// The external cancellation token was cancelled.
    Cancelled,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal(signal) => f.write_str(signal.name()),
            ShutdownTrigger::Requested => f.write_str("programmatic request"),
            ShutdownTrigger::Cancelled => f.write_str("cancellation token"),
        }
    }
}

/// Requests shutdown of a running coordinator.
///
/// Cloneable; a request made before the coordinator runs is kept.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ShutdownHandle {
    /// Request shutdown. A second request while shutting down forces exit.
    ///
    /// Returns `false` if the coordinator is gone.
    pub fn request(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Create a handle and the receiving end the coordinator listens on.
pub(crate) fn shutdown_channel() -> (ShutdownHandle, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ShutdownHandle { tx }, rx)
}

/// Merged trigger stream.
pub(crate) struct ShutdownTriggers {
    signals: Option<OsSignals>,
    requests: Option<mpsc::UnboundedReceiver<()>>,
    cancel: Option<CancellationToken>,
}

enum Polled {
    Trigger(ShutdownTrigger),
    SignalsClosed,
    RequestsClosed,
}

impl ShutdownTriggers {
    /// Register the sources. Signal handlers are installed here.
    pub(crate) fn new(
        handle_signals: bool,
        requests: mpsc::UnboundedReceiver<()>,
        cancel: Option<CancellationToken>,
    ) -> io::Result<Self> {
        let signals = if handle_signals {
            Some(OsSignals::register()?)
        } else {
            None
        };

        Ok(Self {
            signals,
            requests: Some(requests),
            cancel,
        })
    }

    /// Wait for the next trigger. Pends forever once every source is gone.
    pub(crate) async fn next(&mut self) -> ShutdownTrigger {
        loop {
            let polled = tokio::select! {
                signal = recv_signal(&mut self.signals) => match signal {
                    Some(signal) => Polled::Trigger(ShutdownTrigger::Signal(signal)),
                    None => Polled::SignalsClosed,
                },
                request = recv_request(&mut self.requests) => match request {
                    Some(()) => Polled::Trigger(ShutdownTrigger::Requested),
                    None => Polled::RequestsClosed,
                },
                _ = cancelled(&self.cancel) => Polled::Trigger(ShutdownTrigger::Cancelled),
            };

            match polled {
                Polled::Trigger(ShutdownTrigger::Cancelled) => {
                    self.cancel = None;
                    return ShutdownTrigger::Cancelled;
                }
                Polled::Trigger(trigger) => return trigger,
                Polled::SignalsClosed => self.signals = None,
                Polled::RequestsClosed => self.requests = None,
            }
        }
    }
}

async fn recv_signal(signals: &mut Option<OsSignals>) -> Option<ShutdownSignal> {
    match signals {
        Some(signals) => signals.recv().await,
        None => pending().await,
    }
}

async fn recv_request(requests: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match requests {
        Some(requests) => requests.recv().await,
        None => pending().await,
    }
}

async fn cancelled(token: &Option<CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending().await,
    }
}

#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(ShutdownSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(ShutdownSignal::Terminate),
            Some(()) = self.hangup.recv() => Some(ShutdownSignal::Hangup),
            Some(()) = self.quit.recv() => Some(ShutdownSignal::Quit),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::signal::ctrl_c()
            .await
            .ok()
            .map(|()| ShutdownSignal::Interrupt)
    }
}
