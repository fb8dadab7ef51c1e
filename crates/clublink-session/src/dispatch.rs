//! Per-connection reader and dispatcher.
//!
//! Each connection gets two tasks. The reader pumps frames off the socket
//! into a bounded channel; the dispatcher deciphers, decodes, and applies
//! them to the session. Connection loss is reported by the dispatcher
//! only after every frame read before it has been applied, so a rejection
//! that arrives just before the server hangs up is never lost.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clublink_protocol::{
    decode, Endpoint, Failure, MemberRight, Message, NoticeKind, SeatEvent, SystemNotice,
    TableInfo,
};
use clublink_transport::{pump_frames, ConnectionId, Dialer, PumpExit, TransportError};
use tokio::io::ReadHalf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::session::{stopped, Inner};
use crate::{lock, restart, KickVerdict, SessionError, SessionState};

/// Frames buffered between a reader and its dispatcher.
const FRAME_QUEUE_DEPTH: usize = 64;

/// Consecutive frames that fail to decipher before the connection is
/// treated as desynchronised.
const MALFORMED_FRAME_LIMIT: u32 = 16;

pub(crate) fn spawn_connection<D: Dialer>(
    inner: &Arc<Inner<D>>,
    endpoint: Endpoint,
    read: ReadHalf<D::Stream>,
) {
    let conn = ConnectionId::next();
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
    let (exit_tx, exit_rx) = oneshot::channel();
    debug!(%conn, ?endpoint, generation = inner.generation, "connection opened");

    let reader = tokio::spawn(read_loop(Arc::clone(inner), conn, read, frames_tx, exit_tx));
    inner.track(reader);
    let dispatcher = tokio::spawn(dispatch_loop(
        Arc::clone(inner),
        endpoint,
        conn,
        frames_rx,
        exit_rx,
    ));
    inner.track(dispatcher);
}

async fn read_loop<D: Dialer>(
    inner: Arc<Inner<D>>,
    conn: ConnectionId,
    read: ReadHalf<D::Stream>,
    frames: mpsc::Sender<Vec<u8>>,
    exit: oneshot::Sender<Result<PumpExit, TransportError>>,
) {
    let mut stop = inner.stop_tasks.subscribe();
    let outcome = tokio::select! {
        r = pump_frames(read, frames) => r,
        _ = stopped(&mut stop) => {
            trace!(%conn, "reader stopped");
            return;
        }
    };
    let _ = exit.send(outcome);
}

async fn dispatch_loop<D: Dialer>(
    inner: Arc<Inner<D>>,
    endpoint: Endpoint,
    conn: ConnectionId,
    mut frames: mpsc::Receiver<Vec<u8>>,
    exit: oneshot::Receiver<Result<PumpExit, TransportError>>,
) {
    let mut malformed = 0u32;
    while let Some(frame) = frames.recv().await {
        let record = match inner.shared.cipher.decrypt(&frame) {
            Ok(record) => {
                malformed = 0;
                record
            }
            Err(e) => {
                malformed += 1;
                warn!(%conn, error = %e, len = frame.len(), "dropping undecipherable frame");
                if malformed >= MALFORMED_FRAME_LIMIT {
                    connection_lost(
                        &inner,
                        endpoint,
                        TransportError::ConnectionClosed(format!(
                            "{conn}: {malformed} malformed frames in a row"
                        )),
                    );
                    return;
                }
                continue;
            }
        };

        match decode(endpoint, &record) {
            Ok(Some(msg)) => handle(&inner, msg),
            Ok(None) => {}
            Err(e) => {
                let command = record.command();
                warn!(%conn, %command, error = %e, "dropping undecodable record");
            }
        }
    }

    match exit.await {
        Ok(Ok(PumpExit::Eof)) => connection_lost(
            &inner,
            endpoint,
            TransportError::ConnectionClosed(format!("{conn} closed by peer")),
        ),
        Ok(Ok(PumpExit::ReceiverClosed)) => {}
        Ok(Err(e)) => connection_lost(&inner, endpoint, e),
        // The reader was stopped by teardown.
        Err(_) => trace!(%conn, "dispatcher stopped"),
    }
}

/// Reacts to a connection ending, depending on where the session is.
fn connection_lost<D: Dialer>(inner: &Arc<Inner<D>>, endpoint: Endpoint, cause: TransportError) {
    if *inner.stop_tasks.borrow() {
        return;
    }
    match inner.state.load() {
        SessionState::ConnectingAuth | SessionState::ConnectingLobby => {
            let error = SessionError::Connection(cause);
            // Losing the auth connection after the port handoff is normal.
            if inner.fail_step(endpoint, error) {
                warn!(?endpoint, "connection lost during handshake");
            } else {
                debug!(?endpoint, "connection closed during handshake");
            }
        }
        SessionState::Ready => match endpoint {
            Endpoint::Auth => debug!(error = %cause, "auth connection closed"),
            Endpoint::Lobby => {
                warn!(error = %cause, "lobby connection lost");
                restart::request_restart(inner, Duration::ZERO, "lobby connection lost");
            }
        },
        state => debug!(%state, ?endpoint, error = %cause, "connection closed"),
    }
}

fn reject<D: Dialer>(inner: &Inner<D>, endpoint: Endpoint, stage: &'static str, failure: &Failure) {
    warn!(stage, %failure, "logon rejected");
    inner.fail_step(
        endpoint,
        SessionError::ServerRejected {
            stage,
            message: failure.to_string(),
        },
    );
    inner.handler().on_login_done(false);
}

/// Applies one decoded message to the session.
fn handle<D: Dialer>(inner: &Arc<Inner<D>>, msg: Message) {
    let acked = lock(&inner.gate).acknowledge(&msg);
    if let Some(key) = acked {
        inner.queue.remove(&key);
        inner.wake.notify_one();
    }

    let now = Instant::now();
    let handler = inner.handler();
    match msg {
        // -- Handshake --
        Message::AuthLogonSuccess(logon) => {
            info!(user_id = %logon.user_id, nickname = %logon.nickname, "auth logon accepted");
            inner.user_id.store(logon.user_id.0, Ordering::Relaxed);
        }
        Message::AuthLogonFailure(failure) => reject(inner, Endpoint::Auth, "auth logon", &failure),
        Message::AccessList(servers) => {
            match servers.iter().find(|s| s.port != 0) {
                Some(server) => {
                    debug!(port = server.port, name = %server.name, "lobby port handed off");
                    inner.hand_off_port(server.port);
                }
                None => warn!(entries = servers.len(), "access list carries no lobby port"),
            }
        }
        Message::LobbyLogonSuccess { user_right, .. } => {
            debug!(user_right, "lobby logon accepted");
            inner.complete_lobby_logon();
        }
        Message::LobbyLogonFailure(failure) => {
            reject(inner, Endpoint::Lobby, "lobby logon", &failure);
        }

        // -- House and members --
        Message::HouseEntered {
            house_id,
            member_count,
            name,
        } => info!(%house_id, member_count, %name, "entered house"),
        Message::HouseEnterFailed(failure) => warn!(%failure, "entering house failed"),
        Message::MemberList { house_id, members } => {
            {
                let mut caches = lock(&inner.caches);
                caches
                    .members
                    .replace_all(members.iter().map(|m| (m.user_id, m.clone())), now);
                for m in &members {
                    caches.set_forbidden(m.user_id, m.right.is_forbidden(), now);
                }
            }
            debug!(%house_id, count = members.len(), "member list updated");
            handler.on_member_list_updated(house_id, &members);
        }
        Message::MemberInserted { member, .. } => {
            lock(&inner.caches)
                .members
                .insert(member.user_id, member.clone(), now);
            handler.on_member_inserted(&member);
        }
        Message::MemberDeleted { user_id, .. } => {
            {
                let mut caches = lock(&inner.caches);
                caches.members.remove(&user_id);
                caches.forbidden.remove(&user_id);
            }
            handler.on_member_deleted(user_id);
        }
        Message::MemberRightSucceeded => member_right_answered(inner, None),
        Message::MemberRightFailed(failure) => member_right_answered(inner, Some(failure)),

        // -- Tables --
        Message::TableList { house_id, tables } => {
            lock(&inner.caches)
                .tables
                .replace_all(tables.iter().map(|t| (t.table_id, t.clone())), now);
            debug!(%house_id, count = tables.len(), "table list updated");
            handler.on_room_list_updated(&tables);
        }
        Message::UserSat(event) => {
            seat_changed(inner, &event, true, now);
            handler.on_user_sat_down(&event);
        }
        Message::UserStood(event) => {
            seat_changed(inner, &event, false, now);
            handler.on_user_stood_up(&event);
        }
        Message::TableRenewed(renew) => {
            let known = lock(&inner.caches).tables.update(&renew.table_id, now, |t| {
                t.mapped_number = renew.new_mapped_number;
            });
            if !known {
                debug!(table_id = renew.table_id, "renewed table not cached");
            }
            handler.on_table_renewed(&renew);
        }
        Message::TableDismissed {
            table_id,
            mapped_number,
        } => {
            {
                let mut caches = lock(&inner.caches);
                if caches.tables.remove(&table_id).is_none() {
                    if let Some(id) = caches.table_id_for(mapped_number, now) {
                        caches.tables.remove(&id);
                    }
                }
            }
            info!(table_id, mapped_number, "table dismissed");
            handler.on_table_dismissed(table_id, mapped_number);
        }
        Message::TableInfo(table) => {
            lock(&inner.caches)
                .tables
                .insert(table.table_id, table.clone(), now);
            handler.on_table_info(&table);
        }

        // -- Applications and houses --
        Message::Applications {
            house_id,
            applications,
        } => {
            let fresh = lock(&inner.caches).accept_applications(applications, now);
            if !fresh.is_empty() {
                debug!(%house_id, count = fresh.len(), "new join applications");
                handler.on_applications_received(&fresh);
            }
        }
        Message::HouseList(houses) => {
            {
                let mut caches = lock(&inner.caches);
                for &house in &houses {
                    caches.houses.insert(house, (), now);
                }
            }
            handler.on_house_list_updated(&houses);
        }
        Message::OperateSucceeded(result) => debug!(%result, "operation succeeded"),
        Message::OperateFailed(failure) => warn!(%failure, "operation failed"),

        Message::Notice(notice) => handle_notice(inner, notice, now),
    }
}

/// Matches a right-change reply to the change written last.
fn member_right_answered<D: Dialer>(inner: &Inner<D>, failure: Option<Failure>) {
    let Some(tag) = inner.tags.pop() else {
        warn!("member right reply with no change outstanding");
        return;
    };
    let now = Instant::now();
    let success = failure.is_none();
    {
        let mut caches = lock(&inner.caches);
        if success {
            caches.members.update(&tag.member, now, |m| {
                m.right = if tag.forbid {
                    MemberRight(m.right.0 | MemberRight::FORBIDDEN)
                } else {
                    MemberRight(m.right.0 & !MemberRight::FORBIDDEN)
                };
            });
        } else {
            caches.set_forbidden(tag.member, !tag.forbid, now);
        }
    }
    match &failure {
        None => debug!(member = %tag.member, forbid = tag.forbid, "member right changed"),
        Some(f) => warn!(
            member = %tag.member,
            forbid = tag.forbid,
            failure = %f,
            "member right change refused"
        ),
    }
    inner.handler().on_member_right_updated(tag.member, tag.forbid, success);
}

fn seat_changed<D: Dialer>(inner: &Inner<D>, event: &SeatEvent, sat: bool, now: Instant) {
    let mut caches = lock(&inner.caches);
    let known = caches.tables.update(&event.table_id, now, |t| {
        t.player_count = if sat {
            t.player_count.saturating_add(1)
        } else {
            t.player_count.saturating_sub(1)
        };
    });
    if !known && sat {
        let mut table = TableInfo::placeholder(event.table_id, event.mapped_number);
        table.player_count = 1;
        caches.tables.insert(event.table_id, table, now);
    }
}

fn handle_notice<D: Dialer>(inner: &Arc<Inner<D>>, notice: SystemNotice, now: Instant) {
    match notice.kind {
        NoticeKind::ForcedOffline => {
            let verdict = lock(&inner.shared.kicks).record(now);
            match verdict {
                KickVerdict::Backoff { count, delay } => {
                    warn!(count, ?delay, text = %notice.text, "kicked: logged in elsewhere");
                    restart::request_restart(inner, delay, "kicked");
                }
                KickVerdict::Disable { count } => {
                    error!(count, "kicked too often, giving up on reconnecting");
                    restart::terminate(inner, Some(count));
                }
                KickVerdict::AlreadyDisabled => {
                    debug!("kick after reconnecting was disabled");
                    restart::terminate(inner, None);
                }
            }
        }
        NoticeKind::ServiceUnavailable => {
            warn!(text = %notice.text, "service unavailable");
            if inner.may_reconnect() {
                restart::request_restart(inner, Duration::ZERO, "service unavailable");
            }
        }
        NoticeKind::Other => debug!(msg_type = notice.msg_type, text = %notice.text, "notice"),
    }
}
