//! Blocking primitives shared between application threads and the engine.
//!
//! A counting [`Semaphore`] with timed waits, a bounded [`Mailbox`] that carries requests to the
//! engine and a single-value [`Oneshot`] that carries one answer back. None of them ever panics on
//! a poisoned lock, a panicking holder cannot leave a counter in an inconsistent state.
//!
//! [`Semaphore`]: struct.Semaphore.html
//! [`Mailbox`]: struct.Mailbox.html
//! [`Oneshot`]: struct.Oneshot.html
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;

/// A counting semaphore.
///
/// Every `notify` is matched by at most one successful `wait`. Posts are never coalesced, so two
/// waiters parked on the same semaphore need two posts to both resume.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Semaphore {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take one count, blocking up to `timeout` or forever with `None`.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut count = self.lock();
        while *count == 0 {
            count = match deadline {
                None => self.cond.wait(count).unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.cond.wait_timeout(count, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
        *count -= 1;
        true
    }

    /// Take one count if available without blocking.
    pub fn try_wait(&self) -> bool {
        let mut count = self.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Add one count and wake one waiter.
    pub fn notify(&self) {
        *self.lock() += 1;
        self.cond.notify_one();
    }

    /// The current count, for diagnostics and tests.
    pub fn count(&self) -> usize {
        *self.lock()
    }
}

/// A bounded multi-producer queue into the engine.
///
/// Senders block while the queue is full, the receiver blocks while it is empty. The element
/// storage is a lock-free `ArrayQueue`; the two semaphores only count.
pub struct Mailbox<T> {
    queue: ArrayQueue<T>,
    /// Number of queued messages.
    ready: Semaphore,
    /// Number of free slots.
    free: Semaphore,
}

impl<T> Mailbox<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Mailbox {
            queue: ArrayQueue::new(capacity),
            ready: Semaphore::new(0),
            free: Semaphore::new(capacity),
        }
    }

    /// Queue a message, waiting up to `timeout` (forever with `None`) for a free slot.
    ///
    /// Gives the message back if no slot became free in time.
    pub fn send(&self, msg: T, timeout: Option<Duration>) -> Result<(), T> {
        if !self.free.wait(timeout) {
            return Err(msg);
        }
        self.push(msg)
    }

    /// Queue a message only if a slot is free right now.
    pub fn try_send(&self, msg: T) -> Result<(), T> {
        if !self.free.try_wait() {
            return Err(msg);
        }
        self.push(msg)
    }

    fn push(&self, msg: T) -> Result<(), T> {
        match self.queue.push(msg) {
            Ok(()) => {
                self.ready.notify();
                Ok(())
            }
            Err(msg) => {
                // The free count said otherwise, give the slot back.
                self.free.notify();
                Err(msg)
            }
        }
    }

    /// Take the oldest message, waiting up to `timeout` (forever with `None`).
    pub fn recv(&self, timeout: Option<Duration>) -> Option<T> {
        if !self.ready.wait(timeout) {
            return None;
        }
        let msg = self.queue.pop();
        if msg.is_some() {
            self.free.notify();
        }
        msg
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A slot that is filled at most once and waited on by one receiver.
///
/// The value is stored before the semaphore is posted, so a woken receiver always finds it.
pub struct Oneshot<T> {
    value: Mutex<Option<T>>,
    ready: Semaphore,
}

impl<T> Oneshot<T> {
    pub fn new() -> Self {
        Oneshot {
            value: Mutex::new(None),
            ready: Semaphore::new(0),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fill the slot and wake the receiver. Later values are discarded.
    ///
    /// Returns whether the value was stored.
    pub fn put(&self, value: T) -> bool {
        {
            let mut slot = self.slot();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.ready.notify();
        true
    }

    /// Wait up to `timeout` (forever with `None`) for the value.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<T> {
        if !self.ready.wait(timeout) {
            return None;
        }
        self.slot().take()
    }
}

impl<T> Default for Oneshot<T> {
    fn default() -> Self {
        Oneshot::new()
    }
}
