use core::fmt;

use crate::wire::{IpProtocol, Ipv4Address};
use super::{Error, Result};

/// The only address family, IPv4.
pub const AF_INET: i32 = 2;

pub const SOCK_RAW: i32 = 0;
pub const SOCK_DGRAM: i32 = 1;
pub const SOCK_STREAM: i32 = 2;

pub const IPPROTO_ICMP: i32 = 1;
pub const IPPROTO_TCP: i32 = 6;
pub const IPPROTO_UDP: i32 = 17;

/// An IPv4 socket address.
///
/// The unspecified address and port zero stand for "any" when matching and for "unbound" when
/// stored in a socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SockAddr {
    pub addr: Ipv4Address,
    pub port: u16,
}

impl SockAddr {
    pub const ANY: SockAddr = SockAddr { addr: Ipv4Address::UNSPECIFIED, port: 0 };

    pub const fn new(addr: Ipv4Address, port: u16) -> Self {
        SockAddr { addr, port }
    }

    pub fn is_unspecified(&self) -> bool {
        self.addr.is_unspecified() && self.port == 0
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl From<std::net::SocketAddrV4> for SockAddr {
    fn from(addr: std::net::SocketAddrV4) -> Self {
        SockAddr::new((*addr.ip()).into(), addr.port())
    }
}

/// The three kinds of socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SockType {
    Raw,
    Dgram,
    Stream,
}

impl SockType {
    /// Map a `SOCK_*` constant.
    pub fn from_raw(ty: i32) -> Result<Self> {
        match ty {
            SOCK_RAW => Ok(SockType::Raw),
            SOCK_DGRAM => Ok(SockType::Dgram),
            SOCK_STREAM => Ok(SockType::Stream),
            _ => Err(Error::Param),
        }
    }

    /// Resolve the protocol argument of `socket`, zero selecting the default for the type.
    ///
    /// Datagram and stream sockets only accept their own protocol. Raw sockets carry any.
    pub fn protocol(self, protocol: i32) -> Result<IpProtocol> {
        match (self, protocol) {
            (SockType::Raw, 0) => Ok(IpProtocol::Icmp),
            (SockType::Raw, proto) if proto > 0 && proto < 256 => Ok(IpProtocol::from(proto as u8)),
            (SockType::Dgram, 0) | (SockType::Dgram, IPPROTO_UDP) => Ok(IpProtocol::Udp),
            (SockType::Stream, 0) | (SockType::Stream, IPPROTO_TCP) => Ok(IpProtocol::Tcp),
            _ => Err(Error::Param),
        }
    }
}

/// An application-visible socket number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(pub usize);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}
