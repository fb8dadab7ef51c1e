//! Domain types decoded from (or encoded into) lobby records.
//!
//! Identity values are newtype wrappers so a `UserId` can never be passed
//! where a `HouseId` is expected, even though both are `u32` on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A platform account's numeric user ID.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A hosted house (club) ID.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HouseId(pub u32);

impl fmt::Display for HouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Logon
// ---------------------------------------------------------------------------

/// How the client identifies itself to the auth endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMode {
    /// Account name + password hash.
    #[default]
    Account,
    /// Mobile number + password hash.
    Mobile,
}

/// Auth endpoint accepted the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonSuccess {
    pub user_id: UserId,
    pub game_id: u32,
    pub nickname: String,
}

/// A server-side rejection: error code plus human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// One lobby server advertised in the access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub kind_id: u16,
    pub node_id: u16,
    pub sort_id: u16,
    pub server_id: u16,
    pub port: u16,
    pub online: u32,
    pub full: u32,
    pub addr: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// House contents
// ---------------------------------------------------------------------------

/// Member right bits. Only the forbid bit is interpreted by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemberRight(pub u8);

impl MemberRight {
    /// Member may not sit at tables.
    pub const FORBIDDEN: u8 = 0x01;

    pub fn is_forbidden(self) -> bool {
        self.0 & Self::FORBIDDEN != 0
    }
}

/// A member of the house.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub user_id: UserId,
    pub game_id: u32,
    pub right: MemberRight,
    pub status: u8,
    pub score: i64,
    pub nickname: String,
    /// Unix seconds.
    pub join_time: u64,
}

/// A table (game room) inside the house.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableInfo {
    pub table_id: u32,
    /// Server-assigned, renewable slot number players use to find the table.
    pub mapped_number: u32,
    pub owner_id: UserId,
    pub kind_id: u16,
    pub server_id: u16,
    pub chair_count: u16,
    pub player_count: u16,
    pub played_rounds: u16,
    pub total_rounds: u16,
    pub status: u8,
    /// Unix seconds.
    pub create_time: u64,
    pub rule_hash: u64,
}

impl TableInfo {
    /// A row known only from a seat event, before the next full table push.
    pub fn placeholder(table_id: u32, mapped_number: u32) -> Self {
        Self {
            table_id,
            mapped_number,
            ..Self::default()
        }
    }
}

/// A player sat down at or stood up from a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatEvent {
    pub table_id: u32,
    pub mapped_number: u32,
    pub user_id: UserId,
    pub chair: u16,
}

/// A table's mapped number was renewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRenew {
    pub table_id: u32,
    pub old_mapped_number: u32,
    pub new_mapped_number: u32,
}

/// A pending request to join the house.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinApplication {
    pub apply_id: u32,
    pub user_id: UserId,
    pub game_id: u32,
    pub status: u8,
    /// Unix seconds.
    pub apply_time: u64,
    pub nickname: String,
}

// ---------------------------------------------------------------------------
// System notices
// ---------------------------------------------------------------------------

/// What a system notice means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The account logged in elsewhere and this connection was kicked.
    ForcedOffline,
    /// The service is temporarily unavailable; reconnecting may help.
    ServiceUnavailable,
    /// Anything else (announcements, chat, prompts).
    Other,
}

/// A server-pushed text notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemNotice {
    pub kind: NoticeKind,
    pub msg_type: u16,
    pub text: String,
}
