//! Wire protocol for clublink.
//!
//! This crate defines the binary records the lobby platform speaks:
//!
//! - **Records** ([`PacketBuilder`], [`PacketReader`], [`Record`]): an
//!   8-byte header (`version | checksum | length u16 | main u16 | sub u16`)
//!   followed by a fixed-size little-endian payload.
//! - **Cipher** ([`Cipher`] trait, [`PlainCipher`]): the boundary between
//!   plaintext records and wire frames.
//! - **Commands** ([`cmd`], [`outbound`]): command IDs, fixed sizes, and a
//!   builder for every command the client sends.
//! - **Messages** ([`Message`], [`decode`]): typed views of what the
//!   servers push.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Cipher (records) → Protocol (Message) → Session
//! ```

pub mod cmd;
pub mod outbound;

mod cipher;
mod error;
mod message;
mod packet;
mod types;

pub use cipher::{Cipher, PlainCipher, PLAIN_VERSION};
pub use cmd::CommandId;
pub use error::ProtocolError;
pub use message::{
    classify_notice, decode, scan_house_ids, Endpoint, Message, APPLY_LEN,
    FORCED_OFFLINE_MARKERS, HOUSE_ID_RANGE, LIST_HEADER_LEN, MEMBER_LEN, SERVER_ENTRY_LEN,
    SERVICE_UNAVAILABLE_MARKERS, TABLE_LEN,
};
pub use packet::{
    encode_fixed_str, PacketBuilder, PacketReader, Record, MAX_RECORD_LEN, RECORD_HEADER_LEN,
};
pub use types::{
    Failure, GroupMember, HouseId, JoinApplication, LoginMode, LogonSuccess, MemberRight,
    NoticeKind, SeatEvent, ServerEntry, SystemNotice, TableInfo, TableRenew, UserId,
};
