//! Coordinator state machine.
//!
//! ```text
//! Starting ──▶ Running ──▶ ShuttingDown ──▶ Stopped
//!    │                          │
//!    └──────▶ Stopped           └──────▶ ForceKilled
//! ```
//!
//! `Starting ──▶ Stopped` is taken only when startup itself fails.
//! `Stopped` and `ForceKilled` are terminal.

use std::fmt;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle phase of the coordinated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Launch in progress.
    Starting,
    /// Listener and extension setup launched.
    Running,
    /// First shutdown trigger received; draining.
    ShuttingDown,
    /// Listener stopped and cleanup done.
    Stopped,
    /// A second shutdown trigger forced termination.
    ForceKilled,
}

impl LifecycleState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::ForceKilled)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Stopped)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
                | (ShuttingDown, ForceKilled)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
            LifecycleState::ForceKilled => "force killed",
        };
        f.write_str(name)
    }
}

/// Current state plus a watch channel for observers.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<LifecycleState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Starting);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    pub(crate) fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Move to `next` if the transition is legal.
    pub(crate) fn advance(&self, next: LifecycleState) -> bool {
        let mut from = LifecycleState::Starting;
        let moved = self.tx.send_if_modified(|state| {
            from = *state;
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });

        if moved {
            debug!("Lifecycle: {} -> {}", from, next);
        } else {
            warn!("Ignoring lifecycle transition {} -> {}", from, next);
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use LifecycleState::*;
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(ShuttingDown));
        assert!(ShuttingDown.can_transition_to(Stopped));
        assert!(ShuttingDown.can_transition_to(ForceKilled));
    }

    #[test]
    fn test_illegal_transitions() {
        use LifecycleState::*;
        assert!(!Running.can_transition_to(ForceKilled));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!ForceKilled.can_transition_to(Stopped));
        assert!(!Running.can_transition_to(Starting));
    }

    #[test]
    fn test_terminal_states() {
        assert!(LifecycleState::Stopped.is_terminal());
        assert!(LifecycleState::ForceKilled.is_terminal());
        assert!(!LifecycleState::ShuttingDown.is_terminal());
    }

    #[test]
    fn test_state_cell_rejects_skips() {
        let cell = StateCell::new();
        let rx = cell.subscribe();

        assert!(!cell.advance(LifecycleState::ShuttingDown));
        assert_eq!(cell.current(), LifecycleState::Starting);

        assert!(cell.advance(LifecycleState::Running));
        assert_eq!(*rx.borrow(), LifecycleState::Running);
    }
}
