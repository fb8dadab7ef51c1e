//! Forced-offline ("logged in elsewhere") accounting.
//!
//! Kicks closer together than the window accumulate; a longer gap starts
//! the count over. One kick past the threshold disables reconnects for
//! good, since it means the credentials are in use somewhere else and
//! reconnecting would only trade kicks with the other client.

use std::time::{Duration, Instant};

/// What to do about a kick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickVerdict {
    /// Reconnect after `delay`.
    Backoff { count: u32, delay: Duration },
    /// Stop reconnecting and shut down.
    Disable { count: u32 },
    /// Already disabled by an earlier kick.
    AlreadyDisabled,
}

/// Rolling kick counter.
#[derive(Debug, Clone)]
pub struct KickTracker {
    window: Duration,
    threshold: u32,
    backoff: Duration,
    count: u32,
    last: Option<Instant>,
    disabled: bool,
}

impl KickTracker {
    pub fn new(window: Duration, threshold: u32, backoff: Duration) -> Self {
        Self {
            window,
            threshold,
            backoff,
            count: 0,
            last: None,
            disabled: false,
        }
    }

    /// Records a kick at `now`.
    pub fn record(&mut self, now: Instant) -> KickVerdict {
        if self.disabled {
            return KickVerdict::AlreadyDisabled;
        }
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) > self.window {
                self.count = 0;
            }
        }
        self.count += 1;
        self.last = Some(now);

        if self.count > self.threshold {
            self.disabled = true;
            KickVerdict::Disable { count: self.count }
        } else {
            KickVerdict::Backoff {
                count: self.count,
                delay: self.backoff.saturating_mul(self.count),
            }
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}
