//! Per-message parsers for everything the servers push.
//!
//! [`decode`] turns a deciphered [`Record`] into a typed [`Message`].
//! Protocol coverage is partial on purpose: command pairs this client has
//! no use for decode to `Ok(None)` and are dropped by the caller.
//!
//! The auth and lobby endpoints reuse main command 1 with different
//! meanings, so decoding needs to know which endpoint a record came from.

use std::ops::RangeInclusive;

use tracing::trace;

use crate::cmd::{access, auth, house, lobby, system, width};
use crate::{
    Failure, GroupMember, HouseId, JoinApplication, LogonSuccess, MemberRight, NoticeKind,
    PacketReader, ProtocolError, Record, SeatEvent, ServerEntry, SystemNotice, TableInfo,
    TableRenew, UserId,
};

/// Which server a record arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Auth,
    Lobby,
}

/// Everything the client understands from the servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // -- Auth endpoint --
    AuthLogonSuccess(LogonSuccess),
    AuthLogonFailure(Failure),
    AccessList(Vec<ServerEntry>),

    // -- Lobby endpoint --
    LobbyLogonSuccess { user_right: u32, master_right: u32 },
    LobbyLogonFailure(Failure),
    HouseEntered { house_id: HouseId, member_count: u32, name: String },
    HouseEnterFailed(Failure),
    MemberList { house_id: HouseId, members: Vec<GroupMember> },
    MemberInserted { house_id: HouseId, member: GroupMember },
    MemberDeleted { house_id: HouseId, user_id: UserId },
    /// The last member-right change succeeded. The frame names no member.
    MemberRightSucceeded,
    /// The last member-right change failed. The frame names no member.
    MemberRightFailed(Failure),
    TableList { house_id: HouseId, tables: Vec<TableInfo> },
    UserSat(SeatEvent),
    UserStood(SeatEvent),
    TableRenewed(TableRenew),
    TableDismissed { table_id: u32, mapped_number: u32 },
    TableInfo(TableInfo),
    Applications { house_id: HouseId, applications: Vec<JoinApplication> },
    HouseList(Vec<HouseId>),
    OperateSucceeded(Failure),
    OperateFailed(Failure),

    // -- Either endpoint --
    Notice(SystemNotice),
}

/// Decodes a record from `endpoint`.
///
/// # Errors
/// A [`ProtocolError`] when a recognised command's payload is too short
/// for its layout.
pub fn decode(endpoint: Endpoint, record: &Record) -> Result<Option<Message>, ProtocolError> {
    let r = record.reader();
    let msg = match (endpoint, record.main, record.sub) {
        (_, system::MAIN, system::MESSAGE) => Message::Notice(parse_notice(&r)?),

        (Endpoint::Auth, auth::MAIN, auth::LOGON_SUCCESS) => {
            Message::AuthLogonSuccess(parse_logon_success(&r)?)
        }
        (Endpoint::Auth, auth::MAIN, auth::LOGON_FAILURE) => {
            Message::AuthLogonFailure(parse_failure(&r)?)
        }
        (Endpoint::Auth, access::MAIN, access::LIST_SERVER) => {
            Message::AccessList(parse_access_list(&r)?)
        }

        (Endpoint::Lobby, lobby::MAIN, lobby::LOGON_SUCCESS) => Message::LobbyLogonSuccess {
            user_right: r.read_u32(0)?,
            master_right: r.read_u32(4)?,
        },
        (Endpoint::Lobby, lobby::MAIN, lobby::LOGON_FAILURE) => {
            Message::LobbyLogonFailure(parse_failure(&r)?)
        }

        (Endpoint::Lobby, house::MAIN, sub) => match decode_house(sub, &r)? {
            Some(msg) => msg,
            None => {
                trace!(?endpoint, cmd = %record.command(), "unhandled house command");
                return Ok(None);
            }
        },

        _ => {
            trace!(?endpoint, cmd = %record.command(), "unhandled command");
            return Ok(None);
        }
    };
    Ok(Some(msg))
}

fn decode_house(sub: u16, r: &PacketReader<'_>) -> Result<Option<Message>, ProtocolError> {
    let msg = match sub {
        house::ENTER_SUCCESS => Message::HouseEntered {
            house_id: HouseId(r.read_u32(0)?),
            member_count: r.read_u32(4)?,
            name: r.read_str(8, width::HOUSE_NAME)?,
        },
        house::ENTER_FAILURE => Message::HouseEnterFailed(parse_failure(r)?),
        house::MEMBER_LIST => {
            let (house_id, members) = parse_list(r, MEMBER_LEN, parse_member)?;
            Message::MemberList { house_id, members }
        }
        house::MEMBER_INSERT => Message::MemberInserted {
            house_id: HouseId(r.read_u32(0)?),
            member: parse_member(r, 4)?,
        },
        house::MEMBER_DELETE => Message::MemberDeleted {
            house_id: HouseId(r.read_u32(0)?),
            user_id: UserId(r.read_u32(4)?),
        },
        house::RIGHT_SUCCESS => Message::MemberRightSucceeded,
        house::RIGHT_FAILURE => Message::MemberRightFailed(parse_failure(r)?),
        house::TABLE_LIST => {
            let (house_id, tables) = parse_list(r, TABLE_LEN, parse_table)?;
            Message::TableList { house_id, tables }
        }
        house::USER_SIT => Message::UserSat(parse_seat(r)?),
        house::USER_STAND => Message::UserStood(parse_seat(r)?),
        house::TABLE_RENEW => Message::TableRenewed(TableRenew {
            table_id: r.read_u32(0)?,
            old_mapped_number: r.read_u32(4)?,
            new_mapped_number: r.read_u32(8)?,
        }),
        house::TABLE_DISMISS => Message::TableDismissed {
            table_id: r.read_u32(0)?,
            mapped_number: r.read_u32(4)?,
        },
        house::TABLE_INFO => Message::TableInfo(parse_table(r, 4)?),
        house::APPLY_LIST => {
            let (house_id, applications) = parse_list(r, APPLY_LEN, parse_application)?;
            Message::Applications {
                house_id,
                applications,
            }
        }
        house::HOUSE_LIST => Message::HouseList(scan_house_ids(r.payload(), HOUSE_ID_RANGE)),
        house::OPERATE_SUCCESS => Message::OperateSucceeded(parse_failure(r)?),
        house::OPERATE_FAILURE => Message::OperateFailed(parse_failure(r)?),
        _ => return Ok(None),
    };
    Ok(Some(msg))
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

/// `kind u16 | node u16 | sort u16 | server u16 | port u16 | online u32 |
/// full u32 | addr[64] | name[64]`
pub const SERVER_ENTRY_LEN: usize = 146;

/// `user u32 | game u32 | right u8 | status u8 | _ u16 | score i64 |
/// nickname[64] | join_time u64`
pub const MEMBER_LEN: usize = 92;

/// `table u32 | mapped u32 | owner u32 | kind u16 | server u16 | chairs u16 |
/// players u16 | played u16 | total u16 | status u8 | _[7] | created u64 |
/// rule_hash u64`
pub const TABLE_LEN: usize = 48;

/// `apply u32 | user u32 | game u32 | status u8 | _[3] | time u64 |
/// nickname[64]`
pub const APPLY_LEN: usize = 88;

/// List payloads start with `house u32 | count u16 | _ u16`.
pub const LIST_HEADER_LEN: usize = 8;

fn parse_logon_success(r: &PacketReader<'_>) -> Result<LogonSuccess, ProtocolError> {
    Ok(LogonSuccess {
        user_id: UserId(r.read_u32(0)?),
        game_id: r.read_u32(4)?,
        nickname: r.read_str(8, width::NICKNAME)?,
    })
}

/// `code i32 | describe[..]` (describe runs to the end of the payload).
fn parse_failure(r: &PacketReader<'_>) -> Result<Failure, ProtocolError> {
    Ok(Failure {
        code: r.read_i32(0)?,
        message: r.read_tail_str(4, width::DESCRIBE)?,
    })
}

fn parse_access_list(r: &PacketReader<'_>) -> Result<Vec<ServerEntry>, ProtocolError> {
    let count = r.payload_len() / SERVER_ENTRY_LEN;
    (0..count)
        .map(|i| {
            let at = i * SERVER_ENTRY_LEN;
            Ok(ServerEntry {
                kind_id: r.read_u16(at)?,
                node_id: r.read_u16(at + 2)?,
                sort_id: r.read_u16(at + 4)?,
                server_id: r.read_u16(at + 6)?,
                port: r.read_u16(at + 8)?,
                online: r.read_u32(at + 10)?,
                full: r.read_u32(at + 14)?,
                addr: r.read_str(at + 18, width::SERVER_ADDR)?,
                name: r.read_str(at + 82, width::SERVER_NAME)?,
            })
        })
        .collect()
}

/// Parses a `house | count | entries...` list.
fn parse_list<T>(
    r: &PacketReader<'_>,
    entry_len: usize,
    parse: fn(&PacketReader<'_>, usize) -> Result<T, ProtocolError>,
) -> Result<(HouseId, Vec<T>), ProtocolError> {
    let house_id = HouseId(r.read_u32(0)?);
    let count = r.read_u16(4)? as usize;
    let needed = LIST_HEADER_LEN + count * entry_len;
    if r.payload_len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            len: r.payload_len(),
        });
    }
    let items = (0..count)
        .map(|i| parse(r, LIST_HEADER_LEN + i * entry_len))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((house_id, items))
}

fn parse_member(r: &PacketReader<'_>, at: usize) -> Result<GroupMember, ProtocolError> {
    Ok(GroupMember {
        user_id: UserId(r.read_u32(at)?),
        game_id: r.read_u32(at + 4)?,
        right: MemberRight(r.read_u8(at + 8)?),
        status: r.read_u8(at + 9)?,
        score: r.read_i64(at + 12)?,
        nickname: r.read_str(at + 20, width::NICKNAME)?,
        join_time: r.read_u64(at + 84)?,
    })
}

fn parse_table(r: &PacketReader<'_>, at: usize) -> Result<TableInfo, ProtocolError> {
    Ok(TableInfo {
        table_id: r.read_u32(at)?,
        mapped_number: r.read_u32(at + 4)?,
        owner_id: UserId(r.read_u32(at + 8)?),
        kind_id: r.read_u16(at + 12)?,
        server_id: r.read_u16(at + 14)?,
        chair_count: r.read_u16(at + 16)?,
        player_count: r.read_u16(at + 18)?,
        played_rounds: r.read_u16(at + 20)?,
        total_rounds: r.read_u16(at + 22)?,
        status: r.read_u8(at + 24)?,
        create_time: r.read_u64(at + 32)?,
        rule_hash: r.read_u64(at + 40)?,
    })
}

fn parse_application(r: &PacketReader<'_>, at: usize) -> Result<JoinApplication, ProtocolError> {
    Ok(JoinApplication {
        apply_id: r.read_u32(at)?,
        user_id: UserId(r.read_u32(at + 4)?),
        game_id: r.read_u32(at + 8)?,
        status: r.read_u8(at + 12)?,
        apply_time: r.read_u64(at + 16)?,
        nickname: r.read_str(at + 24, width::NICKNAME)?,
    })
}

/// `table u32 | mapped u32 | user u32 | chair u16`
fn parse_seat(r: &PacketReader<'_>) -> Result<SeatEvent, ProtocolError> {
    Ok(SeatEvent {
        table_id: r.read_u32(0)?,
        mapped_number: r.read_u32(4)?,
        user_id: UserId(r.read_u32(8)?),
        chair: r.read_u16(12)?,
    })
}

// ---------------------------------------------------------------------------
// System notices
// ---------------------------------------------------------------------------

/// Substrings that mark a forced-offline kick.
pub const FORCED_OFFLINE_MARKERS: &[&str] = &[
    "logged in elsewhere",
    "在其他地方登录",
    "在别处登录",
];

/// Substrings that mark a temporary service outage.
pub const SERVICE_UNAVAILABLE_MARKERS: &[&str] = &[
    "temporarily unavailable",
    "暂停服务",
    "服务器维护",
];

/// Classifies a notice by its text.
pub fn classify_notice(text: &str) -> NoticeKind {
    if FORCED_OFFLINE_MARKERS.iter().any(|m| text.contains(m)) {
        NoticeKind::ForcedOffline
    } else if SERVICE_UNAVAILABLE_MARKERS.iter().any(|m| text.contains(m)) {
        NoticeKind::ServiceUnavailable
    } else {
        NoticeKind::Other
    }
}

/// `type u16 | length u16 (code units) | text[length * 2]`
fn parse_notice(r: &PacketReader<'_>) -> Result<SystemNotice, ProtocolError> {
    let msg_type = r.read_u16(0)?;
    let units = r.read_u16(2)? as usize;
    let text = r.read_tail_str(4, (units * 2).min(width::DESCRIBE * 2))?;
    Ok(SystemNotice {
        kind: classify_notice(&text),
        msg_type,
        text,
    })
}

// ---------------------------------------------------------------------------
// House discovery
// ---------------------------------------------------------------------------

/// Plausible house IDs for [`scan_house_ids`].
pub const HOUSE_ID_RANGE: RangeInclusive<u16> = 10_000..=65_000;

/// Best-effort heuristic: collects every 16-bit little-endian value at a
/// 2-byte-aligned offset that falls inside `range`.
///
/// The house-list payload has no verified structure; this scan was
/// derived from captured traffic and can report false positives (any
/// other field whose value lands in range). Results are de-duplicated in
/// first-seen order.
pub fn scan_house_ids(payload: &[u8], range: RangeInclusive<u16>) -> Vec<HouseId> {
    let mut found: Vec<HouseId> = Vec::new();
    for pair in payload.chunks_exact(2) {
        let value = u16::from_le_bytes([pair[0], pair[1]]);
        if range.contains(&value) {
            let id = HouseId(u32::from(value));
            if !found.contains(&id) {
                found.push(id);
            }
        }
    }
    found
}
