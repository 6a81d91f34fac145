//! Lifecycle error types.

use super::shutdown::ShutdownTrigger;
use crate::proxy::ProxyError;
use thiserror::Error;

/// Errors that end a coordinated run.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Installing the OS signal handlers failed.
    #[error("Failed to register signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    /// The listener failed to start or serve.
    #[error("Listener failed: {0}")]
    Listener(#[from] ProxyError),

    /// The listener returned without being asked to stop.
    #[error("Listener exited before shutdown was requested")]
    ListenerExited,

    /// A coordinated task panicked.
    #[error("{task} task panicked: {message}")]
    TaskPanicked {
        /// Which task.
        task: &'static str,
        /// Panic description from the runtime.
        message: String,
    },

    /// A second shutdown trigger arrived during graceful shutdown.
    #[error("Forced termination after repeated shutdown trigger ({trigger})")]
    ForceKilled {
        /// The trigger that forced termination.
        trigger: ShutdownTrigger,
    },
}
