//! Service lifecycle coordination.
//!
//! - [`LifecycleState`]: `Starting → Running → ShuttingDown → Stopped`, with
//!   `ShuttingDown → ForceKilled` on a repeated trigger
//! - [`ShutdownHandle`] and [`ShutdownTrigger`]: signals, programmatic
//!   requests and cancellation tokens merged into one stream
//! - [`Coordinator`]: runs the listener and extensions, sequences shutdown

pub mod coordinator;
pub mod error;
pub mod shutdown;
pub mod state;

pub use coordinator::{Coordinator, CoordinatorOptions, ExitHook, FORCED_EXIT_CODE};
pub use error::LifecycleError;
pub use shutdown::{ShutdownHandle, ShutdownSignal, ShutdownTrigger};
pub use state::LifecycleState;
