//! Service lifecycle coordinator.
//!
//! Drives the listener and the extension subsystem as one service:
//!
//! 1. Register shutdown triggers (signals, handle, optional token).
//! 2. Spawn the listener and all extension setups concurrently. The state
//!    becomes `Running` once both are launched, not when they complete.
//! 3. On the first trigger, enter `ShuttingDown` and cancel the listener.
//!    The listener drains within its grace period.
//! 4. Wait for the listener's stopped marker, then run extension cleanup.
//!    Cleanup never overlaps a listener that is still accepting.
//! 5. Join the listener and setup tasks and enter `Stopped`.
//!
//! A second trigger during step 3 or 4 skips the rest: the state becomes
//! `ForceKilled` and the exit hook runs with status 1. The default hook is
//! `std::process::exit`.
//!
//! If the listener fails before any trigger (for example the bind fails),
//! setup is aborted, cleanup runs, and `run` returns the listener error.
//!
//! # Example
//!
//! ```ignore
//! use sluice::lifecycle::{Coordinator, CoordinatorOptions};
//!
//! let coordinator = Coordinator::new(extensions, server, CoordinatorOptions::default());
//! let shutdown = coordinator.shutdown_handle();
//!
//! coordinator.run(None).await?;
//! ```

use super::error::LifecycleError;
use super::shutdown::{ShutdownHandle, ShutdownTrigger, ShutdownTriggers, shutdown_channel};
use super::state::{LifecycleState, StateCell};
use crate::extension::ExtensionManager;
use crate::proxy::ProxyServer;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exit status used on forced termination.
pub const FORCED_EXIT_CODE: i32 = 1;

/// Called with the exit status on forced termination.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Options for a coordinated run.
#[derive(Clone)]
pub struct CoordinatorOptions {
    /// Install OS signal handlers.
    pub handle_signals: bool,
    /// Invoked on forced termination.
    pub exit_hook: ExitHook,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            handle_signals: true,
            exit_hook: Arc::new(|code| std::process::exit(code)),
        }
    }
}

impl CoordinatorOptions {
    /// Do not install OS signal handlers.
    pub fn without_signals(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Replace the forced-termination hook.
    pub fn with_exit_hook(mut self, hook: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit_hook = Arc::new(hook);
        self
    }
}

impl fmt::Debug for CoordinatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorOptions")
            .field("handle_signals", &self.handle_signals)
            .finish_non_exhaustive()
    }
}

/// Owns and sequences the listener and the extension subsystem.
pub struct Coordinator {
    extensions: Arc<ExtensionManager>,
    server: ProxyServer,
    options: CoordinatorOptions,
    state: StateCell,
    handle: ShutdownHandle,
    requests: mpsc::UnboundedReceiver<()>,
}

enum Drain<T> {
    Completed(T),
    Escalated(ShutdownTrigger),
}

impl Coordinator {
    /// Create a coordinator in the `Starting` state.
    pub fn new(
        extensions: ExtensionManager,
        server: ProxyServer,
        options: CoordinatorOptions,
    ) -> Self {
        let (handle, requests) = shutdown_channel();

        Self {
            extensions: Arc::new(extensions),
            server,
            options,
            state: StateCell::new(),
            handle,
            requests,
        }
    }

    /// Handle for programmatic shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Receiver for lifecycle state changes.
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Receiver for the listener's bound address.
    pub fn local_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.server.local_addr()
    }

    /// Receiver for the listener's stopped marker.
    pub fn listener_stopped(&self) -> watch::Receiver<bool> {
        self.server.stopped()
    }

    /// The managed extensions.
    pub fn extensions(&self) -> &Arc<ExtensionManager> {
        &self.extensions
    }

    /// Run until shutdown completes.
    ///
    /// `cancel`, when given, triggers shutdown like a signal does.
    ///
    /// # Errors
    ///
    /// Returns error if signal registration fails, the listener fails, a
    /// task panics, or a second trigger forces termination (only observable
    /// when the exit hook returns).
    pub async fn run(self, cancel: Option<CancellationToken>) -> Result<(), LifecycleError> {
        let Coordinator {
            extensions,
            server,
            options,
            state,
            handle,
            requests,
        } = self;
        drop(handle);

        let mut triggers = match ShutdownTriggers::new(options.handle_signals, requests, cancel) {
            Ok(triggers) => triggers,
            Err(e) => {
                state.advance(LifecycleState::Stopped);
                return Err(LifecycleError::Signals(e));
            }
        };

        let listener_token = CancellationToken::new();
        let mut listener_stopped = server.stopped();
        let mut listener = tokio::spawn(server.serve(listener_token.clone()));
        let mut setup = tokio::spawn({
            let extensions = extensions.clone();
            async move { extensions.setup().await }
        });

        state.advance(LifecycleState::Running);
        info!("Service running");

        let trigger = tokio::select! {
            trigger = triggers.next() => Ok(trigger),
            joined = &mut listener => Err(match joined {
                Ok(Ok(())) => LifecycleError::ListenerExited,
                Ok(Err(e)) => LifecycleError::Listener(e),
                Err(e) => LifecycleError::TaskPanicked {
                    task: "listener",
                    message: e.to_string(),
                },
            }),
        };

        let trigger = match trigger {
            Ok(trigger) => trigger,
            Err(err) => {
                error!("Listener stopped before shutdown was requested: {}", err);
                state.advance(LifecycleState::ShuttingDown);
                stop_setup(&mut setup).await;
                extensions.cleanup().await;
                state.advance(LifecycleState::Stopped);
                return Err(err);
            }
        };

        state.advance(LifecycleState::ShuttingDown);
        info!("Shutdown triggered by {}; draining listener", trigger);
        listener_token.cancel();

        let graceful = async {
            let served = (&mut listener).await;
            // Stopped marker is set on every serve exit path
            let _ = listener_stopped.wait_for(|stopped| *stopped).await;
            info!("Listener stopped; cleaning up extensions");
            extensions.cleanup().await;
            stop_setup(&mut setup).await;
            served
        };

        let drained = tokio::select! {
            served = graceful => Drain::Completed(served),
            second = triggers.next() => Drain::Escalated(second),
        };

        let served = match drained {
            Drain::Completed(served) => served,
            Drain::Escalated(second) => {
                state.advance(LifecycleState::ForceKilled);
                error!(
                    "Received {} during shutdown; forcing exit, remaining cleanup skipped",
                    second
                );
                (options.exit_hook)(FORCED_EXIT_CODE);

                // Only reached when the hook returns
                listener.abort();
                setup.abort();
                return Err(LifecycleError::ForceKilled { trigger: second });
            }
        };

        let result = match served {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LifecycleError::Listener(e)),
            Err(e) => Err(LifecycleError::TaskPanicked {
                task: "listener",
                message: e.to_string(),
            }),
        };

        state.advance(LifecycleState::Stopped);
        match &result {
            Ok(()) => info!("Service stopped"),
            Err(e) => error!("Service stopped with error: {}", e),
        }

        result
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("extensions", &self.extensions)
            .field("listen_addr", &self.server.config().listen_addr)
            .field("state", &self.state.current())
            .field("options", &self.options)
            .finish()
    }
}

/// Abort extension setup if still running and join it.
async fn stop_setup(setup: &mut JoinHandle<()>) {
    if !setup.is_finished() {
        debug!("Stopping extension setup");
        setup.abort();
    }

    match setup.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("Extension setup task panicked: {}", e),
    }
}
