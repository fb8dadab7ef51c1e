//! Correlation of member-right changes with their acknowledgments.
//!
//! The right-change ack carries no request ID, so the sender pushes a tag
//! right before writing each forbid command and the dispatcher pops one
//! per ack. This is only sound because the sender writes one command at a
//! time and waits for its ack.

use std::sync::Mutex;

use clublink_protocol::UserId;

use crate::lock;

/// One in-flight right change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForbidTag {
    pub member: UserId,
    /// `true` to forbid, `false` to lift the forbid.
    pub forbid: bool,
}

/// LIFO stack of [`ForbidTag`]s.
#[derive(Debug, Default)]
pub struct ForbidTagStack {
    tags: Mutex<Vec<ForbidTag>>,
}

impl ForbidTagStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tag: ForbidTag) {
        lock(&self.tags).push(tag);
    }

    pub fn pop(&self) -> Option<ForbidTag> {
        lock(&self.tags).pop()
    }

    pub fn len(&self) -> usize {
        lock(&self.tags).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.tags).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.tags).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: u32, forbid: bool) -> ForbidTag {
        ForbidTag {
            member: UserId(id),
            forbid,
        }
    }

    #[test]
    fn test_push_then_pop_returns_same_tag() {
        let stack = ForbidTagStack::new();
        stack.push(tag(7, true));
        assert_eq!(stack.pop(), Some(tag(7, true)));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_is_lifo() {
        let stack = ForbidTagStack::new();
        stack.push(tag(1, true));
        stack.push(tag(2, false));
        assert_eq!(stack.pop(), Some(tag(2, false)));
        assert_eq!(stack.pop(), Some(tag(1, true)));
    }

    #[test]
    fn test_pop_empty_yields_none() {
        let stack = ForbidTagStack::new();
        assert_eq!(stack.pop(), None);
        stack.push(tag(1, true));
        stack.clear();
        assert_eq!(stack.len(), 0);
        assert_eq!(stack.pop(), None);
    }
}
