//! Lobby session management for clublink.
//!
//! A [`Session`] is one logged-in presence in one house. It owns two
//! connections and everything that happens on them:
//!
//! 1. **Handshake**: log in at the auth endpoint, receive a lobby port,
//!    log in at the lobby, enter the house.
//! 2. **Command pipeline**: a [`CommandQueue`] drained by a single sender
//!    task that keeps at most one ordinary command unacknowledged.
//! 3. **Snapshots**: tables, members, join applications, forbidden
//!    members and discovered houses, kept in expiring caches and patched
//!    as the server pushes events.
//! 4. **Recovery**: dropped connections restart the whole handshake; a
//!    successful restart hands the owner a brand-new [`Session`] through
//!    [`EventHandler::on_session_replaced`]. Repeated "logged in
//!    elsewhere" kicks disable reconnecting ([`KickTracker`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Owner (bot, backend)  ← control API + EventHandler callbacks
//!     ↕
//! Session Layer (this crate)  ← state machine, queue, caches
//!     ↕
//! Protocol Layer (below)  ← records, cipher, message parsers
//!     ↕
//! Transport Layer  ← dialer, frame reassembly
//! ```

mod cache;
mod config;
mod dispatch;
mod error;
mod events;
mod forbid;
mod handshake;
mod kick;
mod queue;
mod restart;
mod sender;
mod session;
mod state;

pub use cache::{Expiry, TtlMap};
pub use config::SessionConfig;
pub use error::SessionError;
pub use events::{EventHandler, NoopHandler};
pub use forbid::{ForbidTag, ForbidTagStack};
pub use kick::{KickTracker, KickVerdict};
pub use queue::{CommandKind, CommandQueue, QueuedCommand};
pub use session::Session;
pub use state::SessionState;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a panicking holder poisoned it.
/// Every critical section here leaves the data consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
