//! # clublink
//!
//! Client for a binary lobby protocol used by card-game platforms: log in
//! through an auth endpoint, hold a session in one house on the lobby
//! endpoint, watch its tables and members, and act on them (forbid
//! members, answer join applications, dismiss or query tables).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clublink::prelude::*;
//!
//! struct Printer;
//!
//! impl EventHandler for Printer {
//!     fn on_room_list_updated(&self, tables: &[TableInfo]) {
//!         println!("{} tables", tables.len());
//!     }
//! }
//!
//! # async fn run() -> Result<(), ClubError> {
//! clublink::logging::init("info");
//! let config = clublink::config::load_file("bot.json")?;
//! let session = Session::connect_tcp(config, PlainCipher, Printer).await?;
//! session.request_house_list()?;
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod logging;

pub use error::ClubError;

pub use clublink_protocol as protocol;
pub use clublink_session as session;
pub use clublink_transport as transport;

/// The types most programs need.
pub mod prelude {
    pub use crate::ClubError;
    pub use clublink_protocol::{
        Cipher, GroupMember, HouseId, JoinApplication, LoginMode, PlainCipher, SeatEvent,
        TableInfo, TableRenew, UserId,
    };
    pub use clublink_session::{EventHandler, Session, SessionConfig, SessionError, SessionState};
    pub use clublink_transport::{Dialer, TcpDialer};
}
