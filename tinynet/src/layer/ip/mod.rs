//! The IP layer.
//!
//! A thin IPv4 layer between the transport protocols and the devices. It keeps a table of
//! interfaces, each with an address, a prefix, an optional gateway and the device it sends
//! through. There is always a loopback interface at index zero.
//!
//! ## Transmitting
//!
//! [`Endpoint::output`] picks a route for the destination, prepends the IPv4 header to the
//! transport payload and queues the datagram on the route's device. Datagrams to one of our own
//! addresses go through the loopback device. Nothing is fragmented, a datagram exceeding the MTU
//! is refused.
//!
//! ## Receiving
//!
//! The stack drains devices with [`Endpoint::receive`] and passes each datagram through
//! [`Endpoint::input`], which checks the header and the destination. Fragments are dropped, there
//! is no reassembly.
//!
//! [`Endpoint::output`]: struct.Endpoint.html#method.output
//! [`Endpoint::receive`]: struct.Endpoint.html#method.receive
//! [`Endpoint::input`]: struct.Endpoint.html#method.input
use crate::nic::{Device, Loopback};
use crate::socket::{Error, Result};
use crate::storage::PktBuf;
use crate::wire::{ipv4_packet, IpProtocol, Ipv4Address, Ipv4Cidr, Ipv4Repr};
use crate::wire::{IPV4_DEFAULT_HOP_LIMIT, IPV4_HEADER_LEN};

#[cfg(test)]
mod tests;

/// A configured network interface.
pub struct Interface {
    pub name: String,
    pub cidr: Ipv4Cidr,
    pub gateway: Option<Ipv4Address>,
    device: Box<dyn Device>,
}

/// Where a datagram to some destination leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    /// Index of the interface.
    pub iface: usize,
    /// Source address to use.
    pub src: Ipv4Address,
    /// MTU of the interface, zero when unknown.
    pub mtu: usize,
    /// The destination is not on a directly attached network.
    pub via_gateway: bool,
}

/// A received datagram that passed the header checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Datagram {
    pub repr: Ipv4Repr,
    /// Octets of IPv4 header in front of the payload.
    pub header_len: usize,
}

/// The interface table and datagram codec.
pub struct Endpoint {
    interfaces: Vec<Interface>,
    /// Identification of the next datagram.
    ident: u16,
    /// Interface to poll first on the next receive.
    next_rx: usize,
}

impl Interface {
    pub fn address(&self) -> Ipv4Address {
        self.cidr.address()
    }

    pub fn mtu(&self) -> usize {
        self.device.personality().mtu
    }

    pub fn is_loopback(&self) -> bool {
        self.device.personality().loopback
    }
}

impl Endpoint {
    /// An endpoint with only the loopback interface `127.0.0.1/8`.
    pub fn new() -> Self {
        let mut ip = Endpoint {
            interfaces: Vec::new(),
            ident: 0,
            next_rx: 0,
        };
        ip.add_interface("loop", Ipv4Cidr::new(Ipv4Address::LOOPBACK, 8), None, Loopback::default());
        ip
    }

    /// Attach a device. Returns the index of the new interface.
    pub fn add_interface<D>(&mut self, name: &str, cidr: Ipv4Cidr, gateway: Option<Ipv4Address>, device: D)
        -> usize
    where
        D: Device + 'static,
    {
        net_debug!("interface {} up: {} via {:?}", name, cidr, gateway);
        self.interfaces.push(Interface {
            name: name.to_string(),
            cidr,
            gateway,
            device: Box::new(device),
        });
        self.interfaces.len() - 1
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Whether `addr` is the address of one of our interfaces.
    pub fn is_local(&self, addr: Ipv4Address) -> bool {
        self.interfaces.iter().any(|iface| iface.address() == addr)
    }

    /// Whether a datagram to `dst` is meant for this host.
    fn accepts(&self, dst: Ipv4Address) -> bool {
        dst.is_broadcast() || self.interfaces.iter().any(|iface| {
            iface.address() == dst
                || iface.cidr.broadcast() == dst
                || (iface.is_loopback() && iface.cidr.contains(dst))
        })
    }

    /// Choose the interface and source address for reaching `dst`.
    ///
    /// Our own addresses are reached through the loopback interface. Otherwise the first interface
    /// whose network contains `dst` wins, and failing that the first non-loopback interface with
    /// a gateway.
    pub fn route(&self, dst: Ipv4Address) -> Option<Route> {
        if dst.is_unspecified() {
            return None;
        }

        if self.is_local(dst) {
            let iface = self.interfaces.iter().position(Interface::is_loopback)?;
            return Some(Route {
                iface,
                src: dst,
                mtu: self.interfaces[iface].mtu(),
                via_gateway: false,
            });
        }

        let direct = self.interfaces.iter()
            .position(|iface| iface.cidr.contains(dst));
        if let Some(iface) = direct {
            return Some(self.route_via(iface, false));
        }

        self.interfaces.iter()
            .position(|iface| !iface.is_loopback() && iface.gateway.is_some())
            .map(|iface| self.route_via(iface, true))
    }

    fn route_via(&self, iface: usize, via_gateway: bool) -> Route {
        let interface = &self.interfaces[iface];
        Route {
            iface,
            src: interface.address(),
            mtu: interface.mtu(),
            via_gateway,
        }
    }

    /// Wrap `payload` into an IPv4 datagram and queue it for sending.
    ///
    /// An unspecified `src` is replaced by the address of the outgoing interface.
    pub fn output(&mut self, protocol: IpProtocol, src: Ipv4Address, dst: Ipv4Address, mut payload: PktBuf)
        -> Result<()>
    {
        let route = match self.route(dst) {
            Some(route) => route,
            None => {
                net_debug!("no route to {}", dst);
                return Err(Error::Unreachable);
            }
        };

        let repr = Ipv4Repr {
            src_addr: if src.is_unspecified() { route.src } else { src },
            dst_addr: dst,
            protocol,
            payload_len: payload.total_size(),
            hop_limit: IPV4_DEFAULT_HOP_LIMIT,
        };
        if route.mtu != 0 && repr.buffer_len() + repr.payload_len > route.mtu {
            net_debug!("{} exceeds mtu {}", repr, route.mtu);
            return Err(Error::Size);
        }

        payload.add_header(repr.buffer_len())?;
        let header = payload.header_mut(repr.buffer_len()).ok_or(Error::Size)?;
        repr.emit(ipv4_packet::new_unchecked_mut(header), self.ident);
        self.ident = self.ident.wrapping_add(1);

        net_trace!("ip out: {}", repr);
        self.interfaces[route.iface].device.transmit(payload)
    }

    /// Take the next datagram any device received, polling interfaces in turn.
    pub fn receive(&mut self) -> Option<PktBuf> {
        let count = self.interfaces.len();
        for offset in 0..count {
            let idx = (self.next_rx + offset) % count;
            if let Some(buf) = self.interfaces[idx].device.receive() {
                self.next_rx = (idx + 1) % count;
                return Some(buf);
            }
        }
        None
    }

    /// Check a received datagram and trim it to its announced length.
    ///
    /// The buffer still starts with the IPv4 header afterwards, its first `header_len` octets are
    /// contiguous.
    pub fn input(&self, buf: &mut PktBuf) -> Result<Datagram> {
        buf.set_cont(IPV4_HEADER_LEN)?;
        let header_len = {
            let header = buf.header(IPV4_HEADER_LEN).ok_or(Error::Size)?;
            ipv4_packet::new_unchecked(header).header_len() as usize
        };
        if header_len < IPV4_HEADER_LEN {
            return Err(Error::Broken);
        }
        buf.set_cont(header_len)?;
        let header = buf.header(header_len).ok_or(Error::Size)?;
        let repr = Ipv4Repr::parse_header(ipv4_packet::new_unchecked(header), buf.total_size())?;

        if !self.accepts(repr.dst_addr) {
            net_trace!("ip in: not for us: {}", repr);
            return Err(Error::Unreachable);
        }

        // Link layers may pad short frames.
        buf.resize(header_len + repr.payload_len);
        net_trace!("ip in: {}", repr);
        Ok(Datagram { repr, header_len })
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new()
    }
}
