//! Encapsulates a network interface card.
//!
//! Also permits software emulation or implementation of one as well, of course. A device here
//! carries whole IPv4 datagrams, link-layer framing is the device's own business.
pub mod external;
pub mod loopback;

use crate::socket::Result;
use crate::storage::PktBuf;

pub use self::external::{External, ExternalHandle};
pub use self::loopback::Loopback;

/// A general description of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Personality {
    /// Largest datagram the device carries, zero when unknown.
    pub mtu: usize,
    /// Whether datagrams sent through the device come straight back.
    pub loopback: bool,
}

impl Personality {
    /// A personality with no extras.
    ///
    /// Indicates an unknown MTU, which makes TCP fall back to its default segment size.
    pub fn baseline() -> Self {
        Personality {
            mtu: 0,
            loopback: false,
        }
    }
}

/// A network device moving IPv4 datagrams.
///
/// The engine is the only user of a device and it never blocks on one. Both directions are
/// queues polled by the engine: `transmit` hands a finished datagram over, `receive` takes the
/// next pending one if there is any.
pub trait Device: Send {
    /// A description of the device.
    fn personality(&self) -> Personality;

    /// Queue a datagram for sending.
    ///
    /// Fails when the device has no room left, the datagram is dropped in that case.
    fn transmit(&mut self, packet: PktBuf) -> Result<()>;

    /// Dequeue the next received datagram.
    fn receive(&mut self) -> Option<PktBuf>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn personality(&self) -> Personality {
        (**self).personality()
    }

    fn transmit(&mut self, packet: PktBuf) -> Result<()> {
        (**self).transmit(packet)
    }

    fn receive(&mut self) -> Option<PktBuf> {
        (**self).receive()
    }
}
