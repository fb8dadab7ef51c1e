//! In-memory auth and lobby servers for session tests.
//!
//! [`MockDialer`] hands the session one end of a `tokio::io::duplex` pipe
//! and runs a scripted server on the other end. Servers speak the real
//! record layout through [`PlainCipher`].

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use clublink_protocol::cmd::{access, auth, house, lobby, system, width};
use clublink_protocol::{
    Cipher, CommandId, GroupMember, HouseId, PacketBuilder, PacketReader, PlainCipher,
    ProtocolError, SeatEvent, TableInfo, UserId,
};
use clublink_session::{EventHandler, Session, SessionConfig};
use clublink_transport::{pump_frames, Dialer, TransportError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, WriteHalf};
use tokio::sync::mpsc;

pub const AUTH_ADDR: &str = "auth:8600";
pub const LOBBY_HOST: &str = "lobby";
pub const LOBBY_PORT: u16 = 9100;
pub const SELF_ID: u32 = 1001;
pub const HOUSE: u32 = 20_001;

/// Members pushed by the lobby: `(user_id, right)`. 3003 starts forbidden.
pub const MEMBERS: [(u32, u8); 3] = [(SELF_ID, 0), (2002, 0), (3003, 1)];

/// Tables pushed on house entry: `(table_id, mapped_number)`.
pub const TABLES: [(u32, u32); 2] = [(501, 100_001), (502, 100_002)];

pub const KICK_TEXT: &str = "Your account logged in elsewhere";

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// A config with every delay shortened for tests.
pub fn config() -> SessionConfig {
    SessionConfig {
        auth_addr: AUTH_ADDR.into(),
        lobby_host: LOBBY_HOST.into(),
        account: "bot-account".into(),
        password_hash: "e10adc3949ba59abbe56e057f20f883e".into(),
        user_id: UserId(SELF_ID),
        house_id: HouseId(HOUSE),
        machine_id: "TEST-MACHINE".into(),
        handshake_timeout: ms(500),
        enter_house_delay: ms(10),
        login_done_delay: ms(30),
        restart_delay: ms(10),
        restart_interval: ms(10),
        kick_backoff: ms(10),
        ack_timeout: ms(500),
        ..SessionConfig::default()
    }
}

/// Polls `cond` until it holds, failing the test after `timeout`.
pub async fn eventually(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(ms(5)).await;
    }
}

// =========================================================================
// Scripted dialer
// =========================================================================

/// Knobs and counters shared by the dialer and its servers.
#[derive(Debug, Default)]
pub struct MockState {
    pub auth_dials: AtomicU32,
    pub lobby_dials: AtomicU32,
    /// Upcoming auth dials that fail to connect.
    pub failing_auth_dials: AtomicU32,
    /// The auth server never answers.
    pub auth_silent: AtomicBool,
    /// The auth server refuses the credentials.
    pub reject_auth: AtomicBool,
    /// House entries answered with a forced-offline notice.
    pub kicks_left: AtomicU32,
    /// Successful writes the first lobby connection accepts before it
    /// starts failing. Zero means no limit.
    pub first_lobby_write_budget: AtomicU32,
    /// Lobby dial (1-based) whose logon is preceded by a kick notice.
    pub kick_before_logon_on_dial: AtomicU32,
    /// Upcoming member-right changes the lobby never answers.
    pub dropped_right_acks: AtomicU32,
    /// Records pushed once, after the table list on the next house entry.
    pub after_enter: Mutex<Vec<Vec<u8>>>,
    /// Frames with a broken checksum pushed once after house entry.
    pub garbage_after_enter: AtomicU32,
    /// Every command the lobby servers received.
    pub received: Mutex<Vec<CommandId>>,
}

impl MockState {
    pub fn received_count(&self, sub: u16) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.main == house::MAIN && c.sub == sub)
            .count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDialer {
    pub state: Arc<MockState>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dialer for MockDialer {
    type Stream = MockStream;

    async fn dial(&self, addr: &str) -> Result<MockStream, TransportError> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        if addr == AUTH_ADDR {
            self.state.auth_dials.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.state.failing_auth_dials) {
                return Err(TransportError::ConnectFailed {
                    addr: addr.to_string(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                });
            }
            tokio::spawn(serve_auth(server, Arc::clone(&self.state)));
            return Ok(MockStream::new(client, None));
        }

        assert_eq!(addr, format!("{LOBBY_HOST}:{LOBBY_PORT}"), "unexpected address");
        let n = self.state.lobby_dials.fetch_add(1, Ordering::SeqCst) + 1;
        let budget = self.state.first_lobby_write_budget.load(Ordering::SeqCst);
        let writes_left = (n == 1 && budget > 0).then_some(budget as usize);
        tokio::spawn(serve_lobby(server, Arc::clone(&self.state), n));
        Ok(MockStream::new(client, writes_left))
    }
}

/// Decrements `counter` if it is positive.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Client end of a duplex pipe that can start failing writes.
#[derive(Debug)]
pub struct MockStream {
    inner: DuplexStream,
    writes_left: Option<usize>,
}

impl MockStream {
    fn new(inner: DuplexStream, writes_left: Option<usize>) -> Self {
        Self { inner, writes_left }
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.writes_left == Some(0) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        let res = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(_)) = res {
            if let Some(n) = self.writes_left.as_mut() {
                *n -= 1;
            }
        }
        res
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// =========================================================================
// Servers
// =========================================================================

type Writer = WriteHalf<DuplexStream>;

async fn send(writer: &mut Writer, record: Vec<u8>) {
    let frame = PlainCipher.encrypt(&record).unwrap();
    // The client may already be gone.
    let _ = writer.write_all(&frame).await;
}

/// Sends a well-framed record whose checksum does not verify.
async fn send_garbage(writer: &mut Writer) {
    let mut frame = PlainCipher.encrypt(&house_entered()).unwrap();
    frame[1] = frame[1].wrapping_add(1);
    let _ = writer.write_all(&frame).await;
}

fn frames(stream: DuplexStream) -> (mpsc::Receiver<Vec<u8>>, Writer) {
    let (read, write) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(pump_frames(read, tx));
    (rx, write)
}

async fn serve_auth(stream: DuplexStream, state: Arc<MockState>) {
    let (mut rx, mut writer) = frames(stream);
    while let Some(frame) = rx.recv().await {
        let record = PlainCipher.decrypt(&frame).unwrap();
        if record.main != auth::MAIN || state.auth_silent.load(Ordering::SeqCst) {
            continue;
        }
        if state.reject_auth.load(Ordering::SeqCst) {
            send(&mut writer, failure(auth::MAIN, auth::LOGON_FAILURE, 3, "wrong password")).await;
            continue;
        }
        send(&mut writer, auth_logon_success()).await;
        send(&mut writer, access_list(LOBBY_PORT)).await;
    }
}

async fn serve_lobby(stream: DuplexStream, state: Arc<MockState>, dial: u32) {
    let (mut rx, mut writer) = frames(stream);
    while let Some(frame) = rx.recv().await {
        let record = PlainCipher.decrypt(&frame).unwrap();
        state.received.lock().unwrap().push(record.command());
        match (record.main, record.sub) {
            (lobby::MAIN, lobby::LOGON_USERID) => {
                if state.kick_before_logon_on_dial.load(Ordering::SeqCst) == dial {
                    send(&mut writer, notice(KICK_TEXT)).await;
                }
                let success = record_with(lobby::MAIN, lobby::LOGON_SUCCESS, |b| {
                    b.push_u32(1)?.push_u32(0)?;
                    Ok(())
                });
                send(&mut writer, success).await;
            }
            (house::MAIN, house::ENTER) => {
                send(&mut writer, house_entered()).await;
                send(&mut writer, table_list()).await;
                let extra = std::mem::take(&mut *state.after_enter.lock().unwrap());
                for record in extra {
                    send(&mut writer, record).await;
                }
                for _ in 0..state.garbage_after_enter.swap(0, Ordering::SeqCst) {
                    send_garbage(&mut writer).await;
                }
                if take_one(&state.kicks_left) {
                    send(&mut writer, notice(KICK_TEXT)).await;
                }
            }
            (house::MAIN, house::QUERY_MEMBERS) => send(&mut writer, member_list()).await,
            (house::MAIN, house::SET_MEMBER_RIGHT) => {
                if !take_one(&state.dropped_right_acks) {
                    let ack = record_with(house::MAIN, house::RIGHT_SUCCESS, |_| Ok(()));
                    send(&mut writer, ack).await;
                }
            }
            (house::MAIN, house::QUERY_TABLE) => {
                let mapped = PacketReader::from_payload(&record.payload).read_u32(8).unwrap();
                send(&mut writer, table_info(501, mapped)).await;
            }
            _ => send(&mut writer, failure(house::MAIN, house::OPERATE_SUCCESS, 0, "ok")).await,
        }
    }
}

// =========================================================================
// Server records
// =========================================================================

type Built = Result<(), ProtocolError>;

pub fn record_with(
    main: u16,
    sub: u16,
    build: impl FnOnce(&mut PacketBuilder) -> Built,
) -> Vec<u8> {
    let mut b = PacketBuilder::new();
    b.set_command(main, sub);
    build(&mut b).unwrap();
    b.finish().unwrap()
}

fn auth_logon_success() -> Vec<u8> {
    record_with(auth::MAIN, auth::LOGON_SUCCESS, |b| {
        b.push_u32(SELF_ID)?.push_u32(88_001)?;
        b.push_str("bot", width::NICKNAME)?;
        Ok(())
    })
}

fn failure(main: u16, sub: u16, code: i32, message: &str) -> Vec<u8> {
    record_with(main, sub, |b| {
        b.push_i32(code)?.push_str(message, 64)?;
        Ok(())
    })
}

fn access_list(port: u16) -> Vec<u8> {
    record_with(access::MAIN, access::LIST_SERVER, |b| {
        b.push_u16(1)?
            .push_u16(1)?
            .push_u16(1)?
            .push_u16(7)?
            .push_u16(port)?
            .push_u32(120)?
            .push_u32(5000)?
            .push_str(LOBBY_HOST, width::SERVER_ADDR)?
            .push_str("Lobby 1", width::SERVER_NAME)?;
        Ok(())
    })
}

fn house_entered() -> Vec<u8> {
    record_with(house::MAIN, house::ENTER_SUCCESS, |b| {
        b.push_u32(HOUSE)?.push_u32(MEMBERS.len() as u32)?;
        b.push_str("Test House", width::HOUSE_NAME)?;
        Ok(())
    })
}

/// Two players seated out of four chairs.
fn push_table(b: &mut PacketBuilder, table_id: u32, mapped: u32) -> Built {
    b.push_u32(table_id)?
        .push_u32(mapped)?
        .push_u32(SELF_ID)?
        .push_u16(302)?
        .push_u16(5)?
        .push_u16(4)?
        .push_u16(2)?
        .push_u16(0)?
        .push_u16(8)?
        .push_u8(1)?;
    b.pad_to(b.payload_len() + 7)?;
    b.push_u64(1_700_000_100)?.push_u64(0xABCD)?;
    Ok(())
}

fn table_list() -> Vec<u8> {
    record_with(house::MAIN, house::TABLE_LIST, |b| {
        b.push_u32(HOUSE)?.push_u16(TABLES.len() as u16)?.push_u16(0)?;
        for (table_id, mapped) in TABLES {
            push_table(b, table_id, mapped)?;
        }
        Ok(())
    })
}

fn table_info(table_id: u32, mapped: u32) -> Vec<u8> {
    record_with(house::MAIN, house::TABLE_INFO, |b| {
        b.push_u32(HOUSE)?;
        push_table(b, table_id, mapped)
    })
}

fn member_list() -> Vec<u8> {
    record_with(house::MAIN, house::MEMBER_LIST, |b| {
        b.push_u32(HOUSE)?.push_u16(MEMBERS.len() as u16)?.push_u16(0)?;
        for (id, right) in MEMBERS {
            b.push_u32(id)?
                .push_u32(id + 80_000)?
                .push_u8(right)?
                .push_u8(1)?
                .push_u16(0)?
                .push_i64(0)?
                .push_str(&format!("member-{id}"), width::NICKNAME)?
                .push_u64(1_700_000_000)?;
        }
        Ok(())
    })
}

pub fn notice(text: &str) -> Vec<u8> {
    let units = text.encode_utf16().count();
    record_with(system::MAIN, system::MESSAGE, |b| {
        b.push_u16(0x0002)?.push_u16(units as u16)?;
        b.push_str(text, (units + 1) * 2)?;
        Ok(())
    })
}

/// A sit (`USER_SIT`) or stand (`USER_STAND`) push.
pub fn seat(sub: u16, table_id: u32, mapped: u32, user: u32, chair: u16) -> Vec<u8> {
    record_with(house::MAIN, sub, |b| {
        b.push_u32(table_id)?.push_u32(mapped)?.push_u32(user)?.push_u16(chair)?;
        Ok(())
    })
}

pub fn table_renewed(table_id: u32, old: u32, new: u32) -> Vec<u8> {
    record_with(house::MAIN, house::TABLE_RENEW, |b| {
        b.push_u32(table_id)?.push_u32(old)?.push_u32(new)?;
        Ok(())
    })
}

pub fn table_dismissed(table_id: u32, mapped: u32) -> Vec<u8> {
    record_with(house::MAIN, house::TABLE_DISMISS, |b| {
        b.push_u32(table_id)?.push_u32(mapped)?;
        Ok(())
    })
}

// =========================================================================
// Recording handler
// =========================================================================

#[derive(Debug, Default)]
pub struct Events {
    pub login_ok: AtomicU32,
    pub login_failed: AtomicU32,
    pub replaced: AtomicU32,
    pub member_lists: AtomicU32,
    pub room_lists: AtomicU32,
    pub reconnect_failed: Mutex<Vec<u32>>,
    pub rights: Mutex<Vec<(UserId, bool, bool)>>,
    pub table_infos: Mutex<Vec<TableInfo>>,
    pub seats: Mutex<Vec<SeatEvent>>,
    pub dismissed: Mutex<Vec<(u32, u32)>>,
    pub latest: Mutex<Option<Session<MockDialer>>>,
}

impl Events {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<Session<MockDialer>> {
        self.latest.lock().unwrap().clone()
    }
}

/// Handler that records every callback into a shared [`Events`].
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub events: Arc<Events>,
}

impl EventHandler<MockDialer> for Recorder {
    fn on_session_replaced(&self, session: Session<MockDialer>) {
        self.events.replaced.fetch_add(1, Ordering::SeqCst);
        *self.events.latest.lock().unwrap() = Some(session);
    }

    fn on_member_list_updated(&self, _house_id: HouseId, _members: &[GroupMember]) {
        self.events.member_lists.fetch_add(1, Ordering::SeqCst);
    }

    fn on_member_right_updated(&self, member: UserId, forbid: bool, success: bool) {
        self.events.rights.lock().unwrap().push((member, forbid, success));
    }

    fn on_login_done(&self, success: bool) {
        let counter = if success {
            &self.events.login_ok
        } else {
            &self.events.login_failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn on_room_list_updated(&self, _tables: &[TableInfo]) {
        self.events.room_lists.fetch_add(1, Ordering::SeqCst);
    }

    fn on_user_sat_down(&self, event: &SeatEvent) {
        self.events.seats.lock().unwrap().push(*event);
    }

    fn on_table_dismissed(&self, table_id: u32, mapped_number: u32) {
        self.events.dismissed.lock().unwrap().push((table_id, mapped_number));
    }

    fn on_table_info(&self, table: &TableInfo) {
        self.events.table_infos.lock().unwrap().push(table.clone());
    }

    fn on_reconnect_failed(&self, attempts: u32) {
        self.events.reconnect_failed.lock().unwrap().push(attempts);
    }
}

/// Connects a session against fresh mock servers.
pub async fn connect(
    dialer: &MockDialer,
    config: SessionConfig,
) -> (Result<Session<MockDialer>, clublink_session::SessionError>, Arc<Events>) {
    let recorder = Recorder::default();
    let events = Arc::clone(&recorder.events);
    let session = Session::connect(config, dialer.clone(), PlainCipher, recorder).await;
    (session, events)
}
