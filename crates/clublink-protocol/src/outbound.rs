//! Builders for every command the client sends.
//!
//! Each function returns a complete plaintext record, padded to the
//! command's fixed size from [`cmd::size`](crate::cmd::size). Field order
//! and widths follow the server's structure layouts exactly.

use crate::cmd::{auth, house, lobby, size, width};
use crate::{HouseId, MemberRight, PacketBuilder, ProtocolError, UserId};

/// Device kind reported at logon.
pub const DEVICE_KIND: u8 = 0x10;

/// Auth logon with account name and password hash.
///
/// Layout: `plaza_version u32 | device u8 | password[66] | account[64] | machine[66]`.
pub fn logon_accounts(
    plaza_version: u32,
    account: &str,
    password_hash: &str,
    machine_id: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let mut b = PacketBuilder::new();
    b.set_command(auth::MAIN, auth::LOGON_ACCOUNTS);
    b.push_u32(plaza_version)?
        .push_u8(DEVICE_KIND)?
        .push_str(password_hash, width::PASSWORD)?
        .push_str(account, width::ACCOUNTS)?
        .push_str(machine_id, width::MACHINE_ID)?
        .pad_to(size::LOGON_ACCOUNTS)?;
    b.finish()
}

/// Auth logon with mobile number and password hash.
///
/// Layout: `plaza_version u32 | device u8 | mobile[24] | password[66] | machine[66]`.
pub fn logon_mobile(
    plaza_version: u32,
    mobile: &str,
    password_hash: &str,
    machine_id: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let mut b = PacketBuilder::new();
    b.set_command(auth::MAIN, auth::LOGON_MOBILE);
    b.push_u32(plaza_version)?
        .push_u8(DEVICE_KIND)?
        .push_str(mobile, width::MOBILE)?
        .push_str(password_hash, width::PASSWORD)?
        .push_str(machine_id, width::MACHINE_ID)?
        .pad_to(size::LOGON_MOBILE)?;
    b.finish()
}

/// Lobby logon with the user ID handed out by the auth endpoint.
///
/// Layout: `plaza_version u32 | user_id u32 | password[66] | machine[66] | device u8`.
pub fn logon_userid(
    plaza_version: u32,
    user_id: UserId,
    password_hash: &str,
    machine_id: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let mut b = PacketBuilder::new();
    b.set_command(lobby::MAIN, lobby::LOGON_USERID);
    b.push_u32(plaza_version)?
        .push_u32(user_id.0)?
        .push_str(password_hash, width::PASSWORD)?
        .push_str(machine_id, width::MACHINE_ID)?
        .push_u8(DEVICE_KIND)?
        .pad_to(size::LOGON_USERID)?;
    b.finish()
}

/// Shared `user_id u32 | house_id u32` prefix of house commands.
fn house_command(
    sub: u16,
    user_id: UserId,
    house_id: HouseId,
) -> Result<PacketBuilder, ProtocolError> {
    let mut b = PacketBuilder::new();
    b.set_command(house::MAIN, sub);
    b.push_u32(user_id.0)?.push_u32(house_id.0)?;
    Ok(b)
}

/// Enter the house. The server answers with the table list.
pub fn enter_house(user_id: UserId, house_id: HouseId) -> Result<Vec<u8>, ProtocolError> {
    let mut b = house_command(house::ENTER, user_id, house_id)?;
    b.pad_to(size::ENTER_HOUSE)?;
    b.finish()
}

/// Request the full member list.
pub fn query_members(user_id: UserId, house_id: HouseId) -> Result<Vec<u8>, ProtocolError> {
    let mut b = house_command(house::QUERY_MEMBERS, user_id, house_id)?;
    b.pad_to(size::QUERY_MEMBERS)?;
    b.finish()
}

/// Set or clear the forbid right on one member.
///
/// Layout: `user u32 | house u32 | member u32 | right u32 | action u8`.
pub fn set_member_right(
    user_id: UserId,
    house_id: HouseId,
    member: UserId,
    forbid: bool,
) -> Result<Vec<u8>, ProtocolError> {
    let mut b = house_command(house::SET_MEMBER_RIGHT, user_id, house_id)?;
    b.push_u32(member.0)?
        .push_u32(u32::from(MemberRight::FORBIDDEN))?
        .push_u8(u8::from(forbid))?
        .pad_to(size::SET_MEMBER_RIGHT)?;
    b.finish()
}

/// Accept or reject a join application.
pub fn respond_apply(
    user_id: UserId,
    house_id: HouseId,
    apply_id: u32,
    accept: bool,
) -> Result<Vec<u8>, ProtocolError> {
    let mut b = house_command(house::RESPOND_APPLY, user_id, house_id)?;
    b.push_u32(apply_id)?
        .push_u8(u8::from(accept))?
        .pad_to(size::RESPOND_APPLY)?;
    b.finish()
}

/// Dismiss the table with the given mapped number.
pub fn dismiss_table(
    user_id: UserId,
    house_id: HouseId,
    mapped_number: u32,
) -> Result<Vec<u8>, ProtocolError> {
    let mut b = house_command(house::DISMISS_TABLE, user_id, house_id)?;
    b.push_u32(mapped_number)?.pad_to(size::DISMISS_TABLE)?;
    b.finish()
}

/// Query one table by mapped number.
pub fn query_table(
    user_id: UserId,
    house_id: HouseId,
    mapped_number: u32,
) -> Result<Vec<u8>, ProtocolError> {
    let mut b = house_command(house::QUERY_TABLE, user_id, house_id)?;
    b.push_u32(mapped_number)?.pad_to(size::QUERY_TABLE)?;
    b.finish()
}

/// Request the list of houses this account belongs to.
pub fn query_houses(user_id: UserId) -> Result<Vec<u8>, ProtocolError> {
    let mut b = PacketBuilder::new();
    b.set_command(house::MAIN, house::QUERY_HOUSES);
    b.push_u32(user_id.0)?.pad_to(size::QUERY_HOUSES)?;
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RECORD_HEADER_LEN;
    use crate::{CommandId, PacketReader};

    fn load(bytes: &[u8]) -> PacketReader<'_> {
        PacketReader::load(bytes).expect("well-formed record")
    }

    #[test]
    fn test_every_command_has_its_fixed_size() {
        let u = UserId(10);
        let h = HouseId(20);
        let cases: Vec<(Vec<u8>, usize)> = vec![
            (logon_accounts(1, "acct", "hash", "m").unwrap(), size::LOGON_ACCOUNTS),
            (logon_mobile(1, "13800000000", "hash", "m").unwrap(), size::LOGON_MOBILE),
            (logon_userid(1, u, "hash", "m").unwrap(), size::LOGON_USERID),
            (enter_house(u, h).unwrap(), size::ENTER_HOUSE),
            (query_members(u, h).unwrap(), size::QUERY_MEMBERS),
            (set_member_right(u, h, UserId(5), true).unwrap(), size::SET_MEMBER_RIGHT),
            (respond_apply(u, h, 9, false).unwrap(), size::RESPOND_APPLY),
            (dismiss_table(u, h, 123456).unwrap(), size::DISMISS_TABLE),
            (query_table(u, h, 123456).unwrap(), size::QUERY_TABLE),
            (query_houses(u).unwrap(), size::QUERY_HOUSES),
        ];
        for (bytes, expected) in cases {
            assert_eq!(bytes.len(), expected + RECORD_HEADER_LEN);
            assert_eq!(load(&bytes).len(), bytes.len());
        }
    }

    #[test]
    fn test_logon_accounts_layout() {
        let bytes = logon_accounts(0x0601_0000, "robot01", "e10adc39", "MID").unwrap();
        let r = load(&bytes);
        assert_eq!(r.command(), CommandId::new(auth::MAIN, auth::LOGON_ACCOUNTS));
        assert_eq!(r.read_u32(0).unwrap(), 0x0601_0000);
        assert_eq!(r.read_u8(4).unwrap(), DEVICE_KIND);
        assert_eq!(r.read_str(5, width::PASSWORD).unwrap(), "e10adc39");
        assert_eq!(r.read_str(71, width::ACCOUNTS).unwrap(), "robot01");
        assert_eq!(r.read_str(135, width::MACHINE_ID).unwrap(), "MID");
    }

    #[test]
    fn test_logon_userid_layout() {
        let bytes = logon_userid(7, UserId(880_001), "pw", "MID").unwrap();
        let r = load(&bytes);
        assert_eq!(r.command(), CommandId::new(lobby::MAIN, lobby::LOGON_USERID));
        assert_eq!(r.read_u32(4).unwrap(), 880_001);
        assert_eq!(r.read_str(8, width::PASSWORD).unwrap(), "pw");
        assert_eq!(r.read_u8(140).unwrap(), DEVICE_KIND);
    }

    #[test]
    fn test_set_member_right_layout() {
        let bytes = set_member_right(UserId(1), HouseId(2), UserId(3), false).unwrap();
        let r = load(&bytes);
        assert_eq!(r.command(), CommandId::new(house::MAIN, house::SET_MEMBER_RIGHT));
        assert_eq!(r.read_u32(0).unwrap(), 1);
        assert_eq!(r.read_u32(4).unwrap(), 2);
        assert_eq!(r.read_u32(8).unwrap(), 3);
        assert_eq!(r.read_u32(12).unwrap(), u32::from(MemberRight::FORBIDDEN));
        assert_eq!(r.read_u8(16).unwrap(), 0);
    }

    #[test]
    fn test_overlong_account_is_truncated_not_overflowed() {
        let account = "x".repeat(200);
        let bytes = logon_accounts(1, &account, "h", "m").unwrap();
        let r = load(&bytes);
        assert_eq!(r.read_str(71, width::ACCOUNTS).unwrap().len(), width::ACCOUNTS / 2 - 1);
        assert_eq!(r.payload_len(), size::LOGON_ACCOUNTS);
    }
}
