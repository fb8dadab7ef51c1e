//! The sender task: the only writer of queued commands.
//!
//! Ordinary commands go out one at a time; the next waits until the
//! server acknowledges the previous one or `ack_timeout` passes.
//! Front-inserted (priority) commands skip that wait.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clublink_protocol::{Endpoint, Message};
use clublink_transport::Dialer;
use tracing::{debug, trace, warn};

use crate::session::{stopped, Inner};
use crate::{lock, restart, CommandKind, ForbidTag, QueuedCommand, SessionError, SessionState};

#[derive(Debug)]
struct Awaiting {
    kind: CommandKind,
    key: String,
    since: Instant,
}

/// At-most-one-outstanding bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct SendGate {
    awaiting: Option<Awaiting>,
    last_sent_key: Option<String>,
}

impl SendGate {
    /// Releases a gate held longer than `ack_timeout`, returning the kind
    /// of the command that was never answered.
    fn expire(&mut self, now: Instant, ack_timeout: Duration) -> Option<CommandKind> {
        let held = now.saturating_duration_since(self.awaiting.as_ref()?.since);
        if held < ack_timeout {
            return None;
        }
        let a = self.awaiting.take()?;
        warn!(kind = ?a.kind, key = %a.key, "no acknowledgment, releasing send gate");
        Some(a.kind)
    }

    /// Whether an ordinary command has to wait.
    fn is_blocked(&self) -> bool {
        self.awaiting.is_some()
    }

    /// `cmd` repeats the command written just before it.
    fn is_repeat(&self, cmd: &QueuedCommand) -> bool {
        cmd.kind.skips_repeat() && self.last_sent_key.as_deref() == Some(cmd.key.as_str())
    }

    fn sent(&mut self, cmd: &QueuedCommand, now: Instant) {
        if !cmd.priority {
            self.awaiting = Some(Awaiting {
                kind: cmd.kind,
                key: cmd.key.clone(),
                since: now,
            });
        }
        self.last_sent_key = Some(cmd.key.clone());
    }

    /// Opens the gate if `msg` answers the awaited command, returning
    /// that command's key.
    pub(crate) fn acknowledge(&mut self, msg: &Message) -> Option<String> {
        if !self.awaiting.as_ref()?.kind.is_acknowledged_by(msg) {
            return None;
        }
        self.last_sent_key = None;
        self.awaiting.take().map(|a| a.key)
    }

    pub(crate) fn reset(&mut self) {
        self.awaiting = None;
        self.last_sent_key = None;
    }
}

pub(crate) fn spawn<D: Dialer>(inner: &Arc<Inner<D>>) {
    let task = tokio::spawn(run(Arc::clone(inner)));
    inner.track(task);
}

/// Next command the gate lets through, removed from the queue.
fn next_command<D: Dialer>(inner: &Inner<D>) -> Option<QueuedCommand> {
    let top = inner.queue.top()?;
    if !top.priority {
        let mut gate = lock(&inner.gate);
        let expired = gate.expire(Instant::now(), inner.config().ack_timeout);
        // An unanswered right change leaves its tag on top of the stack.
        if expired.is_some_and(CommandKind::changes_right) {
            if let Some(tag) = inner.tags.pop() {
                debug!(member = %tag.member, forbid = tag.forbid, "right change unanswered");
            }
        }
        if gate.is_blocked() {
            return None;
        }
    }
    inner.queue.pop()
}

fn forbid_tag(cmd: &QueuedCommand) -> Option<ForbidTag> {
    if !cmd.kind.changes_right() {
        return None;
    }
    let forbid = cmd.kind == CommandKind::Forbid;
    cmd.target.map(|member| ForbidTag { member, forbid })
}

async fn run<D: Dialer>(inner: Arc<Inner<D>>) {
    let mut stop = inner.stop_tasks.subscribe();
    let poll = inner.config().send_poll_interval;
    debug!(generation = inner.generation, "sender started");

    loop {
        if *stop.borrow() || inner.state.load() != SessionState::Ready {
            break;
        }

        let Some(cmd) = next_command(&inner) else {
            tokio::select! {
                _ = inner.wake.notified() => {}
                _ = tokio::time::sleep(poll) => {}
                _ = stopped(&mut stop) => {}
            }
            continue;
        };

        if lock(&inner.gate).is_repeat(&cmd) {
            debug!(kind = ?cmd.kind, key = %cmd.key, "skipping repeat of the previous command");
            continue;
        }

        // The tag has to be in place before the ack can possibly arrive.
        let tag = forbid_tag(&cmd);
        if let Some(tag) = tag {
            inner.tags.push(tag);
        }

        match inner.write_record(Endpoint::Lobby, &cmd.bytes).await {
            Ok(()) => {
                trace!(kind = ?cmd.kind, key = %cmd.key, priority = cmd.priority, "command sent");
                lock(&inner.gate).sent(&cmd, Instant::now());
            }
            Err(e) => {
                if tag.is_some() {
                    inner.tags.pop();
                }
                match &e {
                    SessionError::Connection(t) if t.is_timeout() => {
                        warn!(key = %cmd.key, error = %e, "command write timed out, dropping it");
                    }
                    SessionError::Protocol(_) => {
                        warn!(key = %cmd.key, error = %e, "command not enciphered, dropping it");
                    }
                    _ => {
                        warn!(key = %cmd.key, error = %e, "command write failed");
                        restart::request_restart(&inner, Duration::ZERO, "write failure");
                        break;
                    }
                }
            }
        }
    }
    debug!(generation = inner.generation, "sender stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clublink_protocol::UserId;

    const ACK: Duration = Duration::from_secs(10);

    fn cmd(kind: CommandKind, key: &str) -> QueuedCommand {
        QueuedCommand::new(kind, key, vec![])
    }

    #[test]
    fn test_gate_blocks_until_acknowledged() {
        let mut gate = SendGate::default();
        let now = Instant::now();
        gate.sent(&cmd(CommandKind::GetMembers, "members"), now);
        assert_eq!(gate.expire(now, ACK), None);
        assert!(gate.is_blocked());

        assert_eq!(gate.acknowledge(&Message::HouseList(vec![])), None);
        assert!(gate.is_blocked());

        let reply = Message::MemberList {
            house_id: Default::default(),
            members: vec![],
        };
        assert_eq!(gate.acknowledge(&reply).as_deref(), Some("members"));
        assert!(!gate.is_blocked());
    }

    #[test]
    fn test_gate_releases_after_ack_timeout() {
        let mut gate = SendGate::default();
        let now = Instant::now();
        gate.sent(&cmd(CommandKind::Unforbid, "right:7:0"), now);
        assert_eq!(gate.expire(now + ACK, ACK), Some(CommandKind::Unforbid));
        assert!(!gate.is_blocked());
        assert_eq!(gate.expire(now + ACK, ACK), None);
    }

    #[test]
    fn test_priority_command_does_not_close_gate() {
        let mut gate = SendGate::default();
        let mut dismiss = cmd(CommandKind::DismissTable, "dismiss:1");
        dismiss.priority = true;
        gate.sent(&dismiss, Instant::now());
        assert!(!gate.is_blocked());
    }

    #[test]
    fn test_repeat_detection_only_for_forbid_and_members() {
        let mut gate = SendGate::default();
        let now = Instant::now();
        let forbid = cmd(CommandKind::Forbid, "right:7:1");
        gate.sent(&forbid, now);
        assert!(gate.is_repeat(&forbid));

        let apply = cmd(CommandKind::RespondApply, "right:7:1");
        assert!(!gate.is_repeat(&apply));

        gate.acknowledge(&Message::MemberRightSucceeded);
        assert!(!gate.is_repeat(&forbid));
    }

    #[test]
    fn test_forbid_tag_from_command() {
        let c = cmd(CommandKind::Unforbid, "right:7:0").with_target(UserId(7));
        assert_eq!(
            forbid_tag(&c),
            Some(ForbidTag {
                member: UserId(7),
                forbid: false
            })
        );
        assert_eq!(forbid_tag(&cmd(CommandKind::GetMembers, "members")), None);
    }
}
