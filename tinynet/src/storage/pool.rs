use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::sync::Semaphore;

/// How a pool protects itself against concurrent allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Locking {
    /// Only ever used from one thread, allocation never blocks.
    None,
    /// Shared between threads, allocation may park until an object is freed.
    Thread,
}

/// A fixed set of preallocated objects with a free list.
///
/// Objects are handed out by value and must be given back with [`free`]. The pool never creates
/// objects after construction, so its capacity bounds how many can be outstanding.
///
/// [`free`]: #method.free
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    /// Counts free objects; absent for `Locking::None`.
    gate: Option<Semaphore>,
    capacity: usize,
}

impl<T> Pool<T> {
    /// Create a pool owning `objects`.
    pub fn new(objects: Vec<T>, locking: Locking) -> Self {
        let capacity = objects.len();
        let gate = match locking {
            Locking::None => None,
            Locking::Thread => Some(Semaphore::new(capacity)),
        };
        Pool {
            free: Mutex::new(objects),
            gate,
            capacity,
        }
    }

    fn list(&self) -> MutexGuard<'_, Vec<T>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take an object.
    ///
    /// A negative `timeout_ms`, or a pool without locking, takes the non-blocking path and fails
    /// immediately when empty. Otherwise the caller parks until an object is freed, for at most
    /// `timeout_ms` milliseconds where zero means without limit.
    pub fn alloc(&self, timeout_ms: i32) -> Option<T> {
        match &self.gate {
            Some(gate) if timeout_ms >= 0 => {
                let timeout = match timeout_ms {
                    0 => None,
                    ms => Some(Duration::from_millis(ms as u64)),
                };
                if !gate.wait(timeout) {
                    return None;
                }
                self.list().pop()
            }
            Some(gate) => {
                if !gate.try_wait() {
                    return None;
                }
                self.list().pop()
            }
            None => self.list().pop(),
        }
    }

    /// Return an object, waking one parked allocator.
    pub fn free(&self, object: T) {
        self.list().push(object);
        if let Some(gate) = &self.gate {
            gate.notify();
        }
    }

    /// Number of objects currently available.
    pub fn free_count(&self) -> usize {
        self.list().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
