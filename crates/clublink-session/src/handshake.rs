//! Auth logon, lobby port handoff, lobby logon, house entry.

use std::sync::Arc;

use clublink_protocol::{outbound, Endpoint, LoginMode};
use clublink_transport::Dialer;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::session::{Inner, ENTER_KEY};
use crate::{dispatch, sender, CommandKind, QueuedCommand, Session, SessionError, SessionState};

/// Drives a fresh session from `ConnectingAuth` to `Ready`. On error the
/// caller tears the session down.
pub(crate) async fn run<D: Dialer>(inner: &Arc<Inner<D>>) -> Result<(), SessionError> {
    let config = inner.config();

    // Auth endpoint: credentials in, lobby port out.
    let port_rx = inner.open_port_slot();
    let stream = inner.shared.dialer.dial(&config.auth_addr).await?;
    let (read, write) = tokio::io::split(stream);
    *inner.auth_writer.lock().await = Some(write);
    dispatch::spawn_connection(inner, Endpoint::Auth, read);

    let logon = match config.login_mode {
        LoginMode::Account => outbound::logon_accounts(
            config.plaza_version,
            &config.account,
            &config.password_hash,
            &config.machine_id,
        )?,
        LoginMode::Mobile => outbound::logon_mobile(
            config.plaza_version,
            &config.mobile,
            &config.password_hash,
            &config.machine_id,
        )?,
    };
    inner.write_record(Endpoint::Auth, &logon).await?;
    debug!(addr = %config.auth_addr, mode = ?config.login_mode, "auth logon sent");
    let port = await_step(inner, port_rx, "lobby port handoff").await?;

    // Lobby endpoint.
    if !inner
        .state
        .transition(SessionState::ConnectingAuth, SessionState::ConnectingLobby)
    {
        return Err(SessionError::Cancelled);
    }
    let lobby_rx = inner.open_lobby_slot();
    let addr = config.lobby_addr(port);
    let stream = inner.shared.dialer.dial(&addr).await?;
    let (read, write) = tokio::io::split(stream);
    *inner.lobby_writer.lock().await = Some(write);
    dispatch::spawn_connection(inner, Endpoint::Lobby, read);

    let logon = outbound::logon_userid(
        config.plaza_version,
        inner.user_id(),
        &config.password_hash,
        &config.machine_id,
    )?;
    inner.write_record(Endpoint::Lobby, &logon).await?;
    debug!(%addr, user_id = %inner.user_id(), "lobby logon sent");
    await_step(inner, lobby_rx, "lobby logon").await?;

    if !inner
        .state
        .transition(SessionState::ConnectingLobby, SessionState::Ready)
    {
        return Err(SessionError::Cancelled);
    }
    info!(
        generation = inner.generation,
        user_id = %inner.user_id(),
        house_id = %inner.house_id(),
        lobby = %addr,
        "session ready"
    );

    sender::spawn(inner);
    let follow_up = tokio::spawn(enter_house(Arc::clone(inner)));
    inner.track(follow_up);
    Ok(())
}

async fn await_step<D: Dialer, T>(
    inner: &Inner<D>,
    rx: oneshot::Receiver<Result<T, SessionError>>,
    stage: &'static str,
) -> Result<T, SessionError> {
    match tokio::time::timeout(inner.config().handshake_timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(SessionError::Cancelled),
        Err(_) => Err(SessionError::HandshakeTimeout { stage }),
    }
}

/// Queues house entry, then reports the login and asks for members once
/// the table list has had time to arrive.
async fn enter_house<D: Dialer>(inner: Arc<Inner<D>>) {
    let config = inner.config();
    tokio::time::sleep(config.enter_house_delay).await;
    if inner.state.load() != SessionState::Ready {
        return;
    }
    match outbound::enter_house(inner.user_id(), inner.house_id()) {
        Ok(bytes) => {
            inner
                .queue
                .push(QueuedCommand::new(CommandKind::EnterHouse, ENTER_KEY, bytes));
            inner.wake.notify_one();
        }
        Err(e) => warn!(error = %e, "could not build enter-house command"),
    }

    tokio::time::sleep(config.login_done_delay).await;
    if inner.state.load() != SessionState::Ready {
        return;
    }
    inner.handler().on_login_done(true);
    let session = Session { inner };
    if let Err(e) = session.request_members() {
        debug!(error = %e, "member request after login skipped");
    }
}
