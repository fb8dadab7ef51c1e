//! The session lifecycle as one atomically-updated value.
//!
//! ```text
//!   ConnectingAuth ──→ ConnectingLobby ──→ Ready ──→ Restarting ──→ Terminated
//!         │                  │               │            │             ↑
//!         └──────────────────┴───────────────┴────────────┴→ ShuttingDown
//! ```
//!
//! Every transition is a compare-and-swap, so two tasks racing to
//! restart (or to restart and shut down) cannot both win.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Logging in at the auth endpoint, waiting for the lobby port.
    ConnectingAuth = 0,
    /// Logging in at the lobby endpoint.
    ConnectingLobby = 1,
    /// Handshake complete; commands flow.
    Ready = 2,
    /// Tearing down to build a replacement session.
    Restarting = 3,
    /// `shutdown` is in progress.
    ShuttingDown = 4,
    /// Finished. The session was shut down or replaced.
    Terminated = 5,
}

impl SessionState {
    /// `true` once the session can never become ready again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::ConnectingAuth,
            1 => Self::ConnectingLobby,
            2 => Self::Ready,
            3 => Self::Restarting,
            4 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConnectingAuth => "connecting-auth",
            Self::ConnectingLobby => "connecting-lobby",
            Self::Ready => "ready",
            Self::Restarting => "restarting",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Lock-free holder for a [`SessionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from → to`. Returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves any non-terminal state to `ShuttingDown`. Returns the state
    /// it left, or `None` if another caller got there first.
    pub(crate) fn begin_shutdown(&self) -> Option<SessionState> {
        let mut current = self.load();
        loop {
            if current.is_terminal() {
                return None;
            }
            match self.0.compare_exchange(
                current as u8,
                SessionState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current),
                Err(raw) => current = SessionState::from_u8(raw),
            }
        }
    }

    pub(crate) fn terminate(&self) {
        self.0.store(SessionState::Terminated as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_from_wrong_state_fails() {
        let cell = StateCell::new(SessionState::ConnectingAuth);
        assert!(!cell.transition(SessionState::Ready, SessionState::Restarting));
        assert_eq!(cell.load(), SessionState::ConnectingAuth);
    }

    #[test]
    fn test_transition_only_one_racer_wins() {
        let cell = StateCell::new(SessionState::Ready);
        assert!(cell.transition(SessionState::Ready, SessionState::Restarting));
        assert!(!cell.transition(SessionState::Ready, SessionState::Restarting));
        assert_eq!(cell.load(), SessionState::Restarting);
    }

    #[test]
    fn test_begin_shutdown_is_idempotent() {
        let cell = StateCell::new(SessionState::Restarting);
        assert_eq!(cell.begin_shutdown(), Some(SessionState::Restarting));
        assert_eq!(cell.begin_shutdown(), None);
        cell.terminate();
        assert_eq!(cell.begin_shutdown(), None);
        assert_eq!(cell.load(), SessionState::Terminated);
    }

    #[test]
    fn test_restart_after_shutdown_is_refused() {
        let cell = StateCell::new(SessionState::Ready);
        cell.begin_shutdown();
        assert!(!cell.transition(SessionState::Ready, SessionState::Restarting));
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::ConnectingLobby.to_string(), "connecting-lobby");
        assert!(SessionState::ShuttingDown.is_terminal());
        assert!(!SessionState::Restarting.is_terminal());
    }
}
