//! Restart and termination.
//!
//! A restart never revives a session. It tears the current one down,
//! builds a new one with the next generation number, and hands that to
//! the owner; the old handle ends `Terminated` either way.
//!
//! Kicks can disable reconnecting while a restart is under way, even from
//! inside the half-built replacement. The restart checks for that before
//! every attempt and again before handing a new session over.

use std::sync::Arc;
use std::time::Duration;

use clublink_transport::Dialer;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::session::{stopped, Inner};
use crate::{Session, SessionError, SessionState};

/// Starts a restart of a ready session after `restart_delay + extra_delay`.
/// With auto-reconnect off the session is terminated instead.
pub(crate) fn request_restart<D: Dialer>(
    inner: &Arc<Inner<D>>,
    extra_delay: Duration,
    reason: &'static str,
) {
    if inner.shared.reconnect_disabled() {
        info!(reason, "reconnecting was disabled by kicks, terminating session");
        terminate(inner, None);
        return;
    }
    if !inner.config().auto_reconnect {
        info!(reason, "auto-reconnect is off, terminating session");
        terminate(inner, Some(0));
        return;
    }
    if !inner
        .state
        .transition(SessionState::Ready, SessionState::Restarting)
    {
        debug!(reason, state = %inner.state.load(), "restart not started");
        return;
    }
    warn!(
        reason,
        generation = inner.generation,
        ?extra_delay,
        "restarting session"
    );
    tokio::spawn(run(Arc::clone(inner), extra_delay));
}

/// Ends the session for good. `report` is handed to
/// `on_reconnect_failed`; `None` when that callback already fired.
/// Does nothing if the session is already ending.
pub(crate) fn terminate<D: Dialer>(inner: &Arc<Inner<D>>, report: Option<u32>) {
    let Some(prev) = inner.begin_shutdown() else {
        return;
    };
    info!(from = %prev, ?report, "terminating session");
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        inner.teardown().await;
        inner.finish();
        if let Some(attempts) = report {
            inner.handler().on_reconnect_failed(attempts);
        }
    });
}

/// Ends a restart without a replacement, with the same `report` rule as
/// [`terminate`].
fn give_up<D: Dialer>(old: &Inner<D>, report: Option<u32>) {
    if !old
        .state
        .transition(SessionState::Restarting, SessionState::Terminated)
    {
        return;
    }
    old.queue.clear();
    old.closing.send_replace(true);
    match report {
        Some(attempts) => old.handler().on_reconnect_failed(attempts),
        None => info!(generation = old.generation, "restart dropped, reconnecting is disabled"),
    }
}

/// Sleeps for `delay`. Returns `false` if the session closed first.
async fn pause(closing: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = stopped(closing) => false,
    }
}

async fn run<D: Dialer>(old: Arc<Inner<D>>, extra_delay: Duration) {
    old.teardown().await;
    let mut closing = old.closing.subscribe();
    let config = old.config();

    if !pause(&mut closing, config.restart_delay.saturating_add(extra_delay)).await {
        debug!(generation = old.generation, "restart abandoned");
        return;
    }

    let max = config.max_restart_attempts;
    for attempt in 1..=max {
        if old.state.load().is_terminal() {
            return;
        }
        if old.shared.reconnect_disabled() {
            give_up(&old, None);
            return;
        }
        match Session::establish(Arc::clone(&old.shared), old.generation + 1).await {
            Ok(next) => {
                hand_over(&old, next).await;
                return;
            }
            Err(e @ SessionError::ServerRejected { .. }) => {
                error!(attempt, error = %e, "logon refused, giving up on reconnecting");
                give_up(&old, Some(attempt));
                return;
            }
            Err(e) => {
                warn!(attempt, max, error = %e, "reconnect attempt failed");
                if attempt < max && !pause(&mut closing, config.restart_interval).await {
                    debug!(generation = old.generation, "restart abandoned");
                    return;
                }
            }
        }
    }

    if old.shared.reconnect_disabled() {
        give_up(&old, None);
        return;
    }
    error!(attempts = max, "giving up on reconnecting");
    give_up(&old, Some(max));
}

async fn hand_over<D: Dialer>(old: &Arc<Inner<D>>, next: Session<D>) {
    if old.shared.reconnect_disabled() {
        info!("reconnecting was disabled during the restart, dropping the replacement");
        next.shutdown().await;
        give_up(old, None);
        return;
    }

    // Only the first session's pending writes survive.
    if old.generation == 0 {
        let carried = old.queue.drain_where(|c| c.kind.carries_over_restart());
        if !carried.is_empty() {
            debug!(count = carried.len(), "carrying queued commands over");
            for cmd in carried {
                next.inner.queue.push(cmd);
            }
            next.inner.wake.notify_one();
        }
    }
    old.queue.clear();

    if !old
        .state
        .transition(SessionState::Restarting, SessionState::Terminated)
    {
        info!("session closed during restart, dropping its replacement");
        next.shutdown().await;
        return;
    }
    old.closing.send_replace(true);
    info!(
        from = old.generation,
        to = next.generation(),
        "session replaced"
    );
    old.handler().on_session_replaced(next);
}
