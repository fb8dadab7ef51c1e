//! Pending outbound commands.
//!
//! The queue is shared between the control API (any task) and the
//! session's single sender task. Ordinary commands are de-duplicated by
//! key so that, for example, repeated member-list requests collapse into
//! one while the first is still waiting.

use std::collections::VecDeque;
use std::sync::Mutex;

use clublink_protocol::{Message, UserId};

use crate::lock;

/// What a queued command does. Decides de-duplication, ack matching,
/// and whether the command survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    EnterHouse,
    GetMembers,
    Forbid,
    Unforbid,
    RespondApply,
    DismissTable,
    QueryTable,
    QueryHouses,
}

impl CommandKind {
    /// Still-queued commands of these kinds are copied into the session
    /// that replaces this one after a restart.
    pub fn carries_over_restart(self) -> bool {
        matches!(self, Self::Forbid | Self::Unforbid | Self::DismissTable)
    }

    /// Forbid and unforbid, the commands tracked by the tag stack.
    pub fn changes_right(self) -> bool {
        matches!(self, Self::Forbid | Self::Unforbid)
    }

    /// The sender skips a command of these kinds if its key equals the
    /// key of the command sent just before it.
    pub fn skips_repeat(self) -> bool {
        matches!(self, Self::Forbid | Self::Unforbid | Self::GetMembers)
    }

    /// Whether `msg` is the server's answer to a command of this kind.
    pub fn is_acknowledged_by(self, msg: &Message) -> bool {
        use Message as M;
        match self {
            Self::EnterHouse => matches!(
                msg,
                M::HouseEntered { .. } | M::HouseEnterFailed(_) | M::TableList { .. }
            ),
            Self::GetMembers => matches!(msg, M::MemberList { .. }),
            Self::Forbid | Self::Unforbid => {
                matches!(msg, M::MemberRightSucceeded | M::MemberRightFailed(_))
            }
            Self::RespondApply => matches!(
                msg,
                M::OperateSucceeded(_) | M::OperateFailed(_) | M::Applications { .. }
            ),
            Self::DismissTable => matches!(
                msg,
                M::TableDismissed { .. } | M::OperateSucceeded(_) | M::OperateFailed(_)
            ),
            Self::QueryTable => matches!(msg, M::TableInfo(_) | M::OperateFailed(_)),
            Self::QueryHouses => matches!(msg, M::HouseList(_)),
        }
    }
}

/// One encoded command waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Plaintext record, enciphered at send time.
    pub bytes: Vec<u8>,
    pub kind: CommandKind,
    /// De-duplication key.
    pub key: String,
    /// Member the command acts on, for forbid and unforbid commands.
    pub target: Option<UserId>,
    /// Inserted at the front; not held back by the ack gate.
    pub priority: bool,
}

impl QueuedCommand {
    pub fn new(kind: CommandKind, key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            kind,
            key: key.into(),
            target: None,
            priority: false,
        }
    }

    pub fn with_target(mut self, target: UserId) -> Self {
        self.target = Some(target);
        self
    }
}

/// Thread-safe FIFO with key de-duplication and front insertion.
#[derive(Debug, Default)]
pub struct CommandQueue {
    items: Mutex<VecDeque<QueuedCommand>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `cmd` unless a command with the same key is already
    /// queued. Returns `true` if it was added.
    pub fn push(&self, cmd: QueuedCommand) -> bool {
        let mut items = lock(&self.items);
        if items.iter().any(|c| c.key == cmd.key) {
            return false;
        }
        items.push_back(cmd);
        true
    }

    /// Inserts `cmd` at the front, marking it priority. Never
    /// de-duplicated.
    pub fn add_head(&self, mut cmd: QueuedCommand) {
        cmd.priority = true;
        lock(&self.items).push_front(cmd);
    }

    pub fn pop(&self) -> Option<QueuedCommand> {
        lock(&self.items).pop_front()
    }

    /// Clone of the front command.
    pub fn top(&self) -> Option<QueuedCommand> {
        lock(&self.items).front().cloned()
    }

    /// Clone of the back command.
    pub fn last(&self) -> Option<QueuedCommand> {
        lock(&self.items).back().cloned()
    }

    /// Drops every command with `key`. Returns how many were dropped.
    pub fn remove(&self, key: &str) -> usize {
        let mut items = lock(&self.items);
        let before = items.len();
        items.retain(|c| c.key != key);
        before - items.len()
    }

    /// Removes and returns the commands matching `pred`, in queue order.
    pub fn drain_where(&self, pred: impl Fn(&QueuedCommand) -> bool) -> Vec<QueuedCommand> {
        let mut items = lock(&self.items);
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = items.drain(..).partition(|c| pred(c));
        *items = kept;
        taken.into()
    }

    pub fn clear(&self) {
        lock(&self.items).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// Copy of every queued command, front first.
    pub fn snapshot(&self) -> Vec<QueuedCommand> {
        lock(&self.items).iter().cloned().collect()
    }
}
