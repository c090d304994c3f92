use crate::managed::Key;

use super::{Fd, SockKind};

/// What a socket number refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle {
    pub kind: SockKind,
    pub key: Key,
}

/// Maps application-visible socket numbers to records.
///
/// Numbers are slot indices, the lowest free slot is handed out first. A slot stays taken from
/// `socket` until the record behind it was destroyed, so a number is never reused while its
/// previous record may still be touched.
#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<Option<Handle>>,
}

impl HandleTable {
    pub fn new(capacity: usize) -> Self {
        HandleTable { slots: vec![None; capacity] }
    }

    pub fn alloc(&mut self, handle: Handle) -> Option<Fd> {
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(handle);
        Some(Fd(idx))
    }

    pub fn get(&self, fd: Fd) -> Option<Handle> {
        self.slots.get(fd.0).cloned().flatten()
    }

    /// Release a slot, returns what it referred to.
    pub fn free(&mut self, fd: Fd) -> Option<Handle> {
        self.slots.get_mut(fd.0).and_then(Option::take)
    }

    pub fn used(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
