//! A device whose other end is driven by the embedding code.
//!
//! Datagrams the stack transmits are collected for the owner of the [`ExternalHandle`], and
//! datagrams the owner injects are received by the stack. This stands in for a real card, and it
//! is how tests talk to the stack at the packet level.
//!
//! [`ExternalHandle`]: struct.ExternalHandle.html
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::socket::Result;
use crate::storage::PktBuf;

use super::{Device, Personality};

/// The stack side of an external device.
pub struct External {
    queues: Arc<Mutex<Queues>>,
    personality: Personality,
}

/// The outside side of an external device.
#[derive(Clone)]
pub struct ExternalHandle {
    queues: Arc<Mutex<Queues>>,
}

#[derive(Default)]
struct Queues {
    /// Waiting to be received by the stack.
    rx: VecDeque<PktBuf>,
    /// Transmitted by the stack, not yet taken.
    tx: VecDeque<PktBuf>,
}

fn lock(queues: &Mutex<Queues>) -> MutexGuard<'_, Queues> {
    queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl External {
    /// Create a device with the given MTU and the handle to its far end.
    pub fn new(mtu: usize) -> (Self, ExternalHandle) {
        let queues = Arc::new(Mutex::new(Queues::default()));
        let device = External {
            queues: Arc::clone(&queues),
            personality: Personality { mtu, loopback: false },
        };
        (device, ExternalHandle { queues })
    }
}

impl ExternalHandle {
    /// Queue a datagram for the stack to receive.
    pub fn inject(&self, datagram: &[u8]) {
        lock(&self.queues).rx.push_back(PktBuf::from_slice(datagram));
    }

    /// Take all datagrams the stack sent so far, oldest first.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        lock(&self.queues).tx.drain(..).map(|buf| buf.to_vec()).collect()
    }

    /// Number of transmitted datagrams not yet taken.
    pub fn sent_count(&self) -> usize {
        lock(&self.queues).tx.len()
    }
}

impl Device for External {
    fn personality(&self) -> Personality {
        self.personality
    }

    fn transmit(&mut self, packet: PktBuf) -> Result<()> {
        lock(&self.queues).tx.push_back(packet);
        Ok(())
    }

    fn receive(&mut self) -> Option<PktBuf> {
        lock(&self.queues).rx.pop_front()
    }
}
