//! Command IDs and fixed record sizes.
//!
//! The server validates every inbound record against the exact payload
//! size of its command, so the `size` constants here are part of the wire
//! contract and must not change.

use std::fmt;

/// A `(main, sub)` command pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId {
    pub main: u16,
    pub sub: u16,
}

impl CommandId {
    pub const fn new(main: u16, sub: u16) -> Self {
        Self { main, sub }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.main, self.sub)
    }
}

/// Authentication endpoint: logon.
pub mod auth {
    pub const MAIN: u16 = 1;

    pub const LOGON_ACCOUNTS: u16 = 1;
    pub const LOGON_MOBILE: u16 = 3;

    pub const LOGON_SUCCESS: u16 = 100;
    pub const LOGON_FAILURE: u16 = 101;
}

/// Authentication endpoint: access list (lobby server directory).
pub mod access {
    pub const MAIN: u16 = 2;

    pub const LIST_SERVER: u16 = 104;
}

/// Lobby endpoint: logon.
pub mod lobby {
    pub const MAIN: u16 = 1;

    pub const LOGON_USERID: u16 = 2;

    pub const LOGON_SUCCESS: u16 = 100;
    pub const LOGON_FAILURE: u16 = 101;
}

/// Lobby endpoint: house (club) operations.
pub mod house {
    pub const MAIN: u16 = 12;

    // Client → server.
    pub const ENTER: u16 = 1;
    pub const QUERY_MEMBERS: u16 = 2;
    pub const SET_MEMBER_RIGHT: u16 = 3;
    pub const RESPOND_APPLY: u16 = 4;
    pub const DISMISS_TABLE: u16 = 5;
    pub const QUERY_TABLE: u16 = 6;
    pub const QUERY_HOUSES: u16 = 7;

    // Server → client.
    pub const ENTER_SUCCESS: u16 = 100;
    pub const ENTER_FAILURE: u16 = 101;
    pub const MEMBER_LIST: u16 = 102;
    pub const MEMBER_INSERT: u16 = 103;
    pub const MEMBER_DELETE: u16 = 104;
    pub const RIGHT_SUCCESS: u16 = 105;
    pub const RIGHT_FAILURE: u16 = 106;
    pub const TABLE_LIST: u16 = 107;
    pub const USER_SIT: u16 = 108;
    pub const USER_STAND: u16 = 109;
    pub const TABLE_RENEW: u16 = 110;
    pub const TABLE_DISMISS: u16 = 111;
    pub const TABLE_INFO: u16 = 112;
    pub const APPLY_LIST: u16 = 113;
    pub const HOUSE_LIST: u16 = 114;
    pub const OPERATE_SUCCESS: u16 = 115;
    pub const OPERATE_FAILURE: u16 = 116;
}

/// Server-pushed system notices (either endpoint).
pub mod system {
    pub const MAIN: u16 = 1000;

    pub const MESSAGE: u16 = 1;
}

/// Fixed payload sizes of outbound commands, in bytes.
pub mod size {
    pub const LOGON_ACCOUNTS: usize = 216;
    pub const LOGON_MOBILE: usize = 180;
    pub const LOGON_USERID: usize = 152;
    pub const ENTER_HOUSE: usize = 12;
    pub const QUERY_MEMBERS: usize = 12;
    pub const SET_MEMBER_RIGHT: usize = 20;
    pub const RESPOND_APPLY: usize = 16;
    pub const DISMISS_TABLE: usize = 12;
    pub const QUERY_TABLE: usize = 12;
    pub const QUERY_HOUSES: usize = 8;
}

/// Widths of fixed UTF-16LE string fields, in bytes.
pub mod width {
    pub const ACCOUNTS: usize = 64;
    pub const PASSWORD: usize = 66;
    pub const MACHINE_ID: usize = 66;
    pub const MOBILE: usize = 24;
    pub const NICKNAME: usize = 64;
    pub const SERVER_ADDR: usize = 64;
    pub const SERVER_NAME: usize = 64;
    pub const HOUSE_NAME: usize = 64;
    /// Upper bound for trailing free-text fields (failure reasons, notices).
    pub const DESCRIBE: usize = 512;
}
