//! Wait objects connecting parked application threads to engine events.
//!
//! The engine side, [`Wait`], lives inside a socket record and is only touched by the engine. Each
//! blocking caller registers with [`Wait::add`] and gets a [`Waiter`] back, which it parks on
//! outside the engine. The engine calls [`Wait::wakeup`] whenever the condition a direction waits
//! for may have changed. Every registered waiter is posted exactly once with the given result, a
//! caller must re-check its condition afterwards.
//!
//! A waiter that gave up on its timeout is not unregistered. Its slot is still posted by the next
//! wakeup, which nobody reads, and is pruned once the engine notices the caller is gone.
//!
//! [`Wait`]: struct.Wait.html
//! [`Wait::add`]: struct.Wait.html#method.add
//! [`Wait::wakeup`]: struct.Wait.html#method.wakeup
//! [`Waiter`]: struct.Waiter.html
use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::Oneshot;
use super::{Error, Result};

/// The engine side of one waiting direction.
#[derive(Default)]
pub struct Wait {
    waiting: Vec<Arc<Oneshot<Result<()>>>>,
}

/// A registered caller, to be parked on outside the engine.
pub struct Waiter {
    slot: Arc<Oneshot<Result<()>>>,
    /// Milliseconds, zero waits without limit.
    timeout: u64,
}

/// Which directions of a socket a wakeup concerns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaitMask(u8);

impl WaitMask {
    pub const READ: WaitMask = WaitMask(0b001);
    pub const WRITE: WaitMask = WaitMask(0b010);
    pub const CONN: WaitMask = WaitMask(0b100);
    pub const ALL: WaitMask = WaitMask(0b111);

    pub fn contains(self, other: WaitMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for WaitMask {
    type Output = WaitMask;

    fn bitor(self, rhs: WaitMask) -> WaitMask {
        WaitMask(self.0 | rhs.0)
    }
}

impl Wait {
    pub fn new() -> Self {
        Wait::default()
    }

    /// Register one more caller, parking for at most `timeout` milliseconds (zero: forever).
    pub fn add(&mut self, timeout: u64) -> Waiter {
        // Callers that timed out dropped their end already.
        self.waiting.retain(|slot| Arc::strong_count(slot) > 1);
        let slot = Arc::new(Oneshot::new());
        self.waiting.push(Arc::clone(&slot));
        Waiter { slot, timeout }
    }

    /// Number of registered callers, abandoned ones included.
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    /// Post `result` to every registered caller.
    pub fn wakeup(&mut self, result: Result<()>) {
        for slot in self.waiting.drain(..) {
            slot.put(result);
        }
    }
}

/// A record going away releases whoever still waits on it.
impl Drop for Wait {
    fn drop(&mut self) {
        self.wakeup(Err(Error::Closed));
    }
}

impl fmt::Debug for Wait {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Wait").field("waiting", &self.waiting.len()).finish()
    }
}

impl Waiter {
    /// Park until woken or until the timeout elapsed.
    ///
    /// Returns the result the engine posted, or `Error::Timeout`.
    pub fn wait(self) -> Result<()> {
        let timeout = match self.timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        match self.slot.wait(timeout) {
            Some(result) => result,
            None => Err(Error::Timeout),
        }
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Waiter").field("timeout", &self.timeout).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn every_waiter_is_posted() {
        let mut wait = Wait::new();
        let waiters: Vec<_> = (0..3).map(|_| wait.add(5000)).collect();
        assert_eq!(wait.waiting(), 3);
        let threads: Vec<_> = waiters.into_iter()
            .map(|waiter| thread::spawn(move || waiter.wait()))
            .collect();
        wait.wakeup(Err(Error::Reset));
        assert_eq!(wait.waiting(), 0);
        for thread in threads {
            assert_eq!(thread.join().unwrap(), Err(Error::Reset));
        }
    }

    #[test]
    fn timed_out_waiter_is_tolerated() {
        let mut wait = Wait::new();
        assert_eq!(wait.add(10).wait(), Err(Error::Timeout));
        // The abandoned registration is posted without effect.
        wait.wakeup(Ok(()));
        let waiter = wait.add(10);
        assert_eq!(wait.waiting(), 1);
        // No stale post is left for the new caller.
        assert_eq!(waiter.wait(), Err(Error::Timeout));
    }

    #[test]
    fn abandoned_callers_are_pruned() {
        let mut wait = Wait::new();
        drop(wait.add(0));
        drop(wait.add(0));
        let _kept = wait.add(0);
        assert_eq!(wait.waiting(), 1);
    }

    #[test]
    fn dropped_wait_releases_waiters() {
        let mut wait = Wait::new();
        let waiter = wait.add(0);
        drop(wait);
        assert_eq!(waiter.wait(), Err(Error::Closed));
    }

    #[test]
    fn wakeup_without_waiters_is_lost() {
        let mut wait = Wait::new();
        wait.wakeup(Ok(()));
        assert_eq!(wait.add(10).wait(), Err(Error::Timeout));
    }
}
