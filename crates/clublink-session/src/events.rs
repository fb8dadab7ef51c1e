//! Callbacks from a session to its owner.
//!
//! Every method has an empty default, so an owner implements only what
//! it cares about. Callbacks run on the session's dispatch tasks: keep
//! them short and hand heavy work to a task of your own.

use clublink_protocol::{
    GroupMember, HouseId, JoinApplication, SeatEvent, TableInfo, TableRenew, UserId,
};
use clublink_transport::{Dialer, TcpDialer};

use crate::Session;

/// Receives session events.
///
/// One handler instance is shared by a session and every session that
/// replaces it after a restart.
///
/// # Example
///
/// ```rust
/// use clublink_protocol::SeatEvent;
/// use clublink_session::{EventHandler, Session};
///
/// struct SeatLogger;
///
/// impl EventHandler for SeatLogger {
///     fn on_user_sat_down(&self, event: &SeatEvent) {
///         println!("{} sat at table {}", event.user_id, event.mapped_number);
///     }
///
///     fn on_session_replaced(&self, session: Session) {
///         // Swap the owner's handle here.
///         drop(session);
///     }
/// }
/// ```
pub trait EventHandler<D: Dialer = TcpDialer>: Send + Sync + 'static {
    /// A restart built `session` to take over from the current one. The
    /// old handle is terminated; swap it for this one.
    fn on_session_replaced(&self, _session: Session<D>) {}

    /// The full member list arrived.
    fn on_member_list_updated(&self, _house_id: HouseId, _members: &[GroupMember]) {}

    fn on_member_inserted(&self, _member: &GroupMember) {}

    fn on_member_deleted(&self, _user_id: UserId) {}

    /// The server answered a forbid change for `member`.
    fn on_member_right_updated(&self, _member: UserId, _forbid: bool, _success: bool) {}

    /// `true` once the house is entered; `false` when the server rejected
    /// a logon step.
    fn on_login_done(&self, _success: bool) {}

    /// The full table list arrived.
    fn on_room_list_updated(&self, _tables: &[TableInfo]) {}

    fn on_user_sat_down(&self, _event: &SeatEvent) {}

    fn on_user_stood_up(&self, _event: &SeatEvent) {}

    fn on_table_renewed(&self, _renew: &TableRenew) {}

    fn on_table_dismissed(&self, _table_id: u32, _mapped_number: u32) {}

    /// A single-table query was answered.
    fn on_table_info(&self, _table: &TableInfo) {}

    /// Join applications not answered before.
    fn on_applications_received(&self, _applications: &[JoinApplication]) {}

    fn on_house_list_updated(&self, _houses: &[HouseId]) {}

    /// Reconnecting gave up after `attempts` tries, or was disabled. The
    /// session is terminated.
    fn on_reconnect_failed(&self, _attempts: u32) {}
}

/// A handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl<D: Dialer> EventHandler<D> for NoopHandler {}
