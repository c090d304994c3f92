//! Implementation of a software loop-back device.
use std::collections::VecDeque;

use crate::socket::{Error, Result};
use crate::storage::PktBuf;

use super::{Device, Personality};

/// A software loop-back device.
///
/// Maintains a bounded queue of datagrams in flight. Everything transmitted is received again in
/// the same order.
pub struct Loopback {
    queue: VecDeque<PktBuf>,
    capacity: usize,
    mtu: usize,
}

impl Loopback {
    /// Queue depth used by `Default`.
    pub const DEFAULT_CAPACITY: usize = 50;

    /// Create a loop-back device holding up to `capacity` datagrams.
    pub fn new(capacity: usize, mtu: usize) -> Self {
        Loopback {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            mtu,
        }
    }

    /// Number of datagrams in flight.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Loopback::new(Loopback::DEFAULT_CAPACITY, 1500)
    }
}

impl Device for Loopback {
    fn personality(&self) -> Personality {
        Personality {
            mtu: self.mtu,
            loopback: true,
        }
    }

    fn transmit(&mut self, packet: PktBuf) -> Result<()> {
        if self.queue.len() >= self.capacity {
            net_debug!("loopback full, dropping {} octets", packet.total_size());
            return Err(Error::Memory);
        }
        self.queue.push_back(packet);
        Ok(())
    }

    fn receive(&mut self) -> Option<PktBuf> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loops_in_order() {
        let mut nic = Loopback::new(2, 1500);
        nic.transmit(PktBuf::from_slice(b"one")).unwrap();
        nic.transmit(PktBuf::from_slice(b"two")).unwrap();
        assert_eq!(nic.transmit(PktBuf::from_slice(b"three")), Err(Error::Memory));
        assert_eq!(nic.receive().map(|buf| buf.to_vec()), Some(b"one".to_vec()));
        assert_eq!(nic.receive().map(|buf| buf.to_vec()), Some(b"two".to_vec()));
        assert!(nic.receive().is_none());
    }
}
