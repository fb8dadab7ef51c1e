//! The session handle and its control API.
//!
//! [`Session`] is a cheap, cloneable handle over shared state. All the
//! moving parts (reader, dispatcher and sender tasks, restart sequence)
//! hold the same `Arc<Inner>`; they live in sibling modules and reach
//! back here for the state they share.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clublink_protocol::{
    outbound, Cipher, Endpoint, GroupMember, HouseId, JoinApplication, TableInfo, UserId,
};
use clublink_transport::{Dialer, TcpDialer, TransportError};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Caches;
use crate::sender::SendGate;
use crate::state::StateCell;
use crate::{
    handshake, lock, CommandKind, CommandQueue, EventHandler, ForbidTagStack, KickTracker,
    QueuedCommand, SessionConfig, SessionError, SessionState,
};

/// Queue keys for commands that only ever need one copy in flight.
pub(crate) const ENTER_KEY: &str = "enter-house";
pub(crate) const MEMBERS_KEY: &str = "members";
pub(crate) const HOUSES_KEY: &str = "houses";

/// Handshake replies are handed from the dispatcher to the handshake
/// through these single-use slots.
type Slot<T> = Mutex<Option<oneshot::Sender<Result<T, SessionError>>>>;

/// State that outlives a single connection attempt: one copy is shared
/// by a session and every session that replaces it.
pub(crate) struct Shared<D: Dialer> {
    pub(crate) config: SessionConfig,
    pub(crate) dialer: D,
    pub(crate) cipher: Arc<dyn Cipher>,
    pub(crate) handler: Arc<dyn EventHandler<D>>,
    /// Carried across restarts so kicks add up over reconnects.
    pub(crate) kicks: Mutex<KickTracker>,
}

impl<D: Dialer> Shared<D> {
    /// Set once kicks disabled reconnecting. Holds for every generation.
    pub(crate) fn reconnect_disabled(&self) -> bool {
        lock(&self.kicks).is_disabled()
    }
}

pub(crate) struct Inner<D: Dialer> {
    pub(crate) shared: Arc<Shared<D>>,
    pub(crate) generation: u64,
    pub(crate) state: StateCell,
    pub(crate) user_id: AtomicU32,
    pub(crate) queue: CommandQueue,
    pub(crate) tags: ForbidTagStack,
    pub(crate) caches: Mutex<Caches>,
    pub(crate) gate: Mutex<SendGate>,
    /// Wakes the sender when the queue or the gate changes.
    pub(crate) wake: Notify,
    /// Tells connection and sender tasks to exit.
    pub(crate) stop_tasks: watch::Sender<bool>,
    /// Set once the session turns terminal; interrupts restart waits.
    pub(crate) closing: watch::Sender<bool>,
    pub(crate) auth_writer: AsyncMutex<Option<WriteHalf<D::Stream>>>,
    pub(crate) lobby_writer: AsyncMutex<Option<WriteHalf<D::Stream>>>,
    pub(crate) port_slot: Slot<u16>,
    pub(crate) lobby_slot: Slot<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: Dialer> Inner<D> {
    fn new(shared: Arc<Shared<D>>, generation: u64) -> Self {
        let config = &shared.config;
        Self {
            generation,
            state: StateCell::new(SessionState::ConnectingAuth),
            user_id: AtomicU32::new(config.user_id.0),
            queue: CommandQueue::new(),
            tags: ForbidTagStack::new(),
            caches: Mutex::new(Caches::new(config)),
            gate: Mutex::new(SendGate::default()),
            wake: Notify::new(),
            stop_tasks: watch::channel(false).0,
            closing: watch::channel(false).0,
            auth_writer: AsyncMutex::new(None),
            lobby_writer: AsyncMutex::new(None),
            port_slot: Mutex::new(None),
            lobby_slot: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            shared,
        }
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub(crate) fn handler(&self) -> &dyn EventHandler<D> {
        self.shared.handler.as_ref()
    }

    pub(crate) fn user_id(&self) -> UserId {
        UserId(self.user_id.load(Ordering::Relaxed))
    }

    pub(crate) fn house_id(&self) -> HouseId {
        self.shared.config.house_id
    }

    /// Whether a lost connection may be replaced by a new session.
    pub(crate) fn may_reconnect(&self) -> bool {
        self.config().auto_reconnect && !self.shared.reconnect_disabled()
    }

    /// Keeps `handle` so teardown can abort it.
    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Moves to `ShuttingDown` and wakes anything waiting on a restart.
    /// Returns the state it left, or `None` if already terminal.
    pub(crate) fn begin_shutdown(&self) -> Option<SessionState> {
        let prev = self.state.begin_shutdown()?;
        self.closing.send_replace(true);
        Some(prev)
    }

    /// Marks the session finished for good.
    pub(crate) fn finish(&self) {
        self.queue.clear();
        self.state.terminate();
        self.closing.send_replace(true);
    }

    /// Stops every task, closes both connections, and flushes the caches.
    /// The command queue is left alone: a restart still needs it.
    pub(crate) async fn teardown(&self) {
        self.stop_tasks.send_replace(true);
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for task in tasks {
            task.abort();
        }

        for writer in [&self.auth_writer, &self.lobby_writer] {
            let taken = writer.lock().await.take();
            if let Some(mut w) = taken {
                let _ = w.shutdown().await;
            }
        }

        self.cancel_handshake();
        self.tags.clear();
        lock(&self.caches).clear();
        lock(&self.gate).reset();
        debug!(generation = self.generation, "session torn down");
    }

    /// Opens the slot the dispatcher fills with the lobby port.
    pub(crate) fn open_port_slot(&self) -> oneshot::Receiver<Result<u16, SessionError>> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.port_slot) = Some(tx);
        rx
    }

    /// Opens the slot the dispatcher fills on lobby logon.
    pub(crate) fn open_lobby_slot(&self) -> oneshot::Receiver<Result<(), SessionError>> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.lobby_slot) = Some(tx);
        rx
    }

    /// Delivers the handed-off port. Later deliveries are ignored.
    pub(crate) fn hand_off_port(&self, port: u16) -> bool {
        let taken = lock(&self.port_slot).take();
        taken.is_some_and(|tx| tx.send(Ok(port)).is_ok())
    }

    pub(crate) fn complete_lobby_logon(&self) -> bool {
        let taken = lock(&self.lobby_slot).take();
        taken.is_some_and(|tx| tx.send(Ok(())).is_ok())
    }

    /// Fails the handshake step waiting on `endpoint`. Returns `false` if
    /// that step is not waiting.
    pub(crate) fn fail_step(&self, endpoint: Endpoint, error: SessionError) -> bool {
        match endpoint {
            Endpoint::Auth => {
                let taken = lock(&self.port_slot).take();
                taken.is_some_and(|tx| tx.send(Err(error)).is_ok())
            }
            Endpoint::Lobby => {
                let taken = lock(&self.lobby_slot).take();
                taken.is_some_and(|tx| tx.send(Err(error)).is_ok())
            }
        }
    }

    /// Cancels whichever handshake step is waiting, if any.
    fn cancel_handshake(&self) {
        for endpoint in [Endpoint::Auth, Endpoint::Lobby] {
            self.fail_step(endpoint, SessionError::Cancelled);
        }
    }

    /// Enciphers `record` and writes it to `endpoint`.
    pub(crate) async fn write_record(
        &self,
        endpoint: Endpoint,
        record: &[u8],
    ) -> Result<(), SessionError> {
        let frame = self.shared.cipher.encrypt(record)?;
        let slot = match endpoint {
            Endpoint::Auth => &self.auth_writer,
            Endpoint::Lobby => &self.lobby_writer,
        };
        let mut guard = slot.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            TransportError::ConnectionClosed(format!("{endpoint:?} endpoint is not connected"))
        })?;

        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        match tokio::time::timeout(self.config().write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::SendFailed(e).into()),
            Err(_) => Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            ))
            .into()),
        }
    }
}

/// Resolves once `rx` reads `true` (or its sender is gone).
pub(crate) async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// A logged-in presence in one house.
///
/// Cloning is cheap; every clone drives the same session. A session is
/// never reused after a restart: the replacement arrives through
/// [`EventHandler::on_session_replaced`] and this handle turns
/// [`Terminated`](SessionState::Terminated).
///
/// Dropping the handles does not stop the background tasks. Call
/// [`shutdown`](Self::shutdown).
pub struct Session<D: Dialer = TcpDialer> {
    pub(crate) inner: Arc<Inner<D>>,
}

impl<D: Dialer> Clone for Session<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Dialer> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.inner.generation)
            .field("state", &self.state())
            .field("user_id", &self.user_id())
            .field("house_id", &self.house_id())
            .finish_non_exhaustive()
    }
}

impl Session<TcpDialer> {
    /// Connects over TCP, with socket options taken from `config`.
    pub async fn connect_tcp(
        config: SessionConfig,
        cipher: impl Cipher,
        handler: impl EventHandler<TcpDialer>,
    ) -> Result<Self, SessionError> {
        let dialer = TcpDialer::new(config.socket_config());
        Self::connect(config, dialer, cipher, handler).await
    }
}

impl<D: Dialer> Session<D> {
    /// Runs the full handshake and returns a ready session.
    ///
    /// # Errors
    /// - [`SessionError::Connection`] if either endpoint cannot be reached
    /// - [`SessionError::HandshakeTimeout`] if the lobby port or the lobby
    ///   logon reply does not arrive within `handshake_timeout`
    /// - [`SessionError::ServerRejected`] if a logon step is refused
    pub async fn connect(
        config: SessionConfig,
        dialer: D,
        cipher: impl Cipher,
        handler: impl EventHandler<D>,
    ) -> Result<Self, SessionError> {
        let config = config.validated();
        let kicks = KickTracker::new(
            config.kick_window,
            config.kick_threshold,
            config.kick_backoff,
        );
        let shared = Arc::new(Shared {
            config,
            dialer,
            cipher: Arc::new(cipher),
            handler: Arc::new(handler),
            kicks: Mutex::new(kicks),
        });
        Self::establish(shared, 0).await
    }

    /// Builds a session of the given generation and runs its handshake.
    pub(crate) async fn establish(
        shared: Arc<Shared<D>>,
        generation: u64,
    ) -> Result<Self, SessionError> {
        let inner = Arc::new(Inner::new(shared, generation));
        match handshake::run(&inner).await {
            Ok(()) => Ok(Self { inner }),
            Err(e) => {
                inner.begin_shutdown();
                inner.teardown().await;
                inner.finish();
                Err(e)
            }
        }
    }

    // -- Snapshot accessors --

    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    /// 0 for a session built by `connect`, +1 for each restart since.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn user_id(&self) -> UserId {
        self.inner.user_id()
    }

    pub fn house_id(&self) -> HouseId {
        self.inner.house_id()
    }

    /// `false` once auto-reconnect is off in the config or kicks have
    /// disabled it.
    pub fn auto_reconnect(&self) -> bool {
        self.inner.may_reconnect()
    }

    /// Known tables, ordered by table ID.
    pub fn tables(&self) -> Vec<TableInfo> {
        let mut tables = lock(&self.inner.caches).tables.values(Instant::now());
        tables.sort_by_key(|t| t.table_id);
        tables
    }

    /// The table currently holding `mapped_number`.
    pub fn table(&self, mapped_number: u32) -> Option<TableInfo> {
        lock(&self.inner.caches)
            .tables
            .values(Instant::now())
            .into_iter()
            .find(|t| t.mapped_number == mapped_number)
    }

    /// House members, ordered by user ID.
    pub fn members(&self) -> Vec<GroupMember> {
        let mut members = lock(&self.inner.caches).members.values(Instant::now());
        members.sort_by_key(|m| m.user_id);
        members
    }

    /// Join applications not answered yet, ordered by application ID.
    pub fn applications(&self) -> Vec<JoinApplication> {
        let mut apps = lock(&self.inner.caches).applications.values(Instant::now());
        apps.sort_by_key(|a| a.apply_id);
        apps
    }

    pub fn forbidden_members(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = lock(&self.inner.caches)
            .forbidden
            .entries(Instant::now())
            .into_iter()
            .map(|(id, ())| id)
            .collect();
        ids.sort();
        ids
    }

    /// Houses seen in house-list replies.
    pub fn houses(&self) -> Vec<HouseId> {
        let mut ids: Vec<HouseId> = lock(&self.inner.caches)
            .houses
            .entries(Instant::now())
            .into_iter()
            .map(|(id, ())| id)
            .collect();
        ids.sort();
        ids
    }

    /// Commands queued and not yet written.
    pub fn pending_commands(&self) -> usize {
        self.inner.queue.len()
    }

    /// Right changes written and not answered yet.
    pub fn pending_right_changes(&self) -> usize {
        self.inner.tags.len()
    }

    // -- Control API --

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.state().is_terminal() {
            return Err(SessionError::Terminated);
        }
        Ok(())
    }

    fn enqueue(&self, cmd: QueuedCommand) -> bool {
        let added = self.inner.queue.push(cmd);
        if added {
            self.inner.wake.notify_one();
        }
        added
    }

    /// Forbids (or lifts the forbid on) each member, skipping this
    /// session's own account. The forbidden-member snapshot is updated
    /// right away and reverted if the server refuses.
    ///
    /// Returns how many commands were queued.
    pub fn forbid_members(&self, members: &[UserId], forbid: bool) -> Result<usize, SessionError> {
        self.ensure_active()?;
        let me = self.user_id();
        let house = self.house_id();
        let kind = if forbid {
            CommandKind::Forbid
        } else {
            CommandKind::Unforbid
        };

        let mut queued = 0;
        for &member in members {
            if member == me {
                debug!(%member, "not changing own right");
                continue;
            }
            let bytes = outbound::set_member_right(me, house, member, forbid)?;
            let key = format!("right:{}:{}", member.0, u8::from(forbid));
            if self.enqueue(QueuedCommand::new(kind, key, bytes).with_target(member)) {
                queued += 1;
            }
            lock(&self.inner.caches).set_forbidden(member, forbid, Instant::now());
        }
        Ok(queued)
    }

    /// Asks for the member list unless a request is already last in the
    /// queue. Returns `true` if one was queued.
    pub fn request_members(&self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if self
            .inner
            .queue
            .last()
            .is_some_and(|c| c.kind == CommandKind::GetMembers)
        {
            return Ok(false);
        }
        let bytes = outbound::query_members(self.user_id(), self.house_id())?;
        Ok(self.enqueue(QueuedCommand::new(CommandKind::GetMembers, MEMBERS_KEY, bytes)))
    }

    /// Accepts or rejects a join application.
    pub fn respond_application(&self, apply_id: u32, accept: bool) -> Result<(), SessionError> {
        self.ensure_active()?;
        let bytes = outbound::respond_apply(self.user_id(), self.house_id(), apply_id, accept)?;
        self.enqueue(QueuedCommand::new(
            CommandKind::RespondApply,
            format!("apply:{apply_id}"),
            bytes,
        ));
        lock(&self.inner.caches).mark_processed(apply_id, Instant::now());
        Ok(())
    }

    /// Dismisses a table. Jumps the queue.
    pub fn dismiss_table(&self, mapped_number: i64) -> Result<(), SessionError> {
        self.ensure_active()?;
        let mapped = positive_mapped_number(mapped_number)?;
        let bytes = outbound::dismiss_table(self.user_id(), self.house_id(), mapped)?;
        self.inner.queue.add_head(QueuedCommand::new(
            CommandKind::DismissTable,
            format!("dismiss:{mapped}"),
            bytes,
        ));
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Queries one table. Jumps the queue.
    ///
    /// # Errors
    /// [`SessionError::InvalidArgument`] for a zero or negative number;
    /// nothing is queued.
    pub fn query_table(&self, mapped_number: i64) -> Result<(), SessionError> {
        self.ensure_active()?;
        let mapped = positive_mapped_number(mapped_number)?;
        let bytes = outbound::query_table(self.user_id(), self.house_id(), mapped)?;
        self.inner.queue.add_head(QueuedCommand::new(
            CommandKind::QueryTable,
            format!("table:{mapped}"),
            bytes,
        ));
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Asks for the houses this account belongs to.
    pub fn request_house_list(&self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        let bytes = outbound::query_houses(self.user_id())?;
        Ok(self.enqueue(QueuedCommand::new(CommandKind::QueryHouses, HOUSES_KEY, bytes)))
    }

    /// Re-enters the house, which makes the server push the full table
    /// list again.
    pub fn request_tables(&self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        let bytes = outbound::enter_house(self.user_id(), self.house_id())?;
        Ok(self.enqueue(QueuedCommand::new(CommandKind::EnterHouse, ENTER_KEY, bytes)))
    }

    /// Closes both connections, stops every task, and drops the
    /// snapshots. Safe to call more than once, and from any clone.
    pub async fn shutdown(&self) {
        let Some(prev) = self.inner.begin_shutdown() else {
            debug!("shutdown already done");
            return;
        };
        info!(
            user_id = %self.user_id(),
            house_id = %self.house_id(),
            from = %prev,
            "shutting down session"
        );
        self.inner.teardown().await;
        self.inner.finish();
    }
}

fn positive_mapped_number(value: i64) -> Result<u32, SessionError> {
    u32::try_from(value)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            SessionError::InvalidArgument(format!("mapped number must be positive, got {value}"))
        })
}
