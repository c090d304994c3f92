//! The udp layer.
//!
//! Datagram sockets without any connection state. Inbound datagrams are matched to a socket by
//! destination port, then filtered by the local address and by the remote address and port where
//! the socket set them. Address and port zero match anything. Each socket queues a bounded number
//! of datagrams, later ones are dropped since there is no way to slow the sender down.
//!
//! An unbound socket gets a port from the dynamic range on its first send.
use std::collections::VecDeque;

use crate::config::Config;
use crate::managed::{Key, SlotMap};
use crate::socket::{Error, Progress, Result, SockAddr, Sock, SockOps, WaitMask};
use crate::storage::PktBuf;
use crate::wire::{checksum, udp_finish_checksum, udp_packet, IpProtocol, UdpRepr};
use crate::wire::UDP_HEADER_LEN;

use super::{Context, PortAllocator};
use super::ip::Datagram;

#[cfg(test)]
mod tests;

/// One UDP socket.
#[derive(Debug)]
pub struct Udp {
    base: Sock,
    /// Payloads with their sender.
    queue: VecDeque<(PktBuf, SockAddr)>,
}

/// All UDP sockets.
pub struct Endpoint {
    sockets: SlotMap<Udp>,
    ports: PortAllocator,
    queue_limit: usize,
}

impl Endpoint {
    pub fn new(config: &Config) -> Self {
        Endpoint {
            sockets: SlotMap::with_capacity(config.udp.max_sockets),
            ports: PortAllocator::new(config),
            queue_limit: config.udp.recv_queue,
        }
    }

    pub fn create(&mut self) -> Result<Key> {
        let udp = Udp {
            base: Sock::new(IpProtocol::Udp, WaitMask::READ),
            queue: VecDeque::new(),
        };
        self.sockets.insert(udp).ok_or_else(|| {
            net_debug!("udp: no free socket");
            Error::Memory
        })
    }

    /// The socket a datagram from `src` to `dst` belongs to.
    fn find(&self, src: SockAddr, dst: SockAddr) -> Option<Key> {
        if dst.port == 0 {
            return None;
        }
        self.sockets.iter()
            .find(|(_, udp)| {
                let base = &udp.base;
                base.local.port == dst.port
                    && (base.local.addr.is_unspecified() || base.local.addr == dst.addr)
                    && (base.remote.addr.is_unspecified() || base.remote.addr == src.addr)
                    && (base.remote.port == 0 || base.remote.port == src.port)
            })
            .map(|(key, _)| key)
    }

    /// Queue a received datagram on its socket.
    ///
    /// `buf` starts with the IPv4 header. Returns the socket the payload was queued on. A full
    /// queue drops the payload but still names the socket.
    pub fn input(&mut self, datagram: &Datagram, mut buf: PktBuf) -> Result<Key> {
        let ip = &datagram.repr;
        let header_len = datagram.header_len;
        buf.set_cont(header_len + UDP_HEADER_LEN)?;
        let repr = {
            let header = buf.header(header_len + UDP_HEADER_LEN).ok_or(Error::Size)?;
            UdpRepr::parse_header(udp_packet::new_unchecked(&header[header_len..]), ip.payload_len)?
        };

        let src = SockAddr::new(ip.src_addr, repr.src_port);
        let dst = SockAddr::new(ip.dst_addr, repr.dst_port);
        let key = match self.find(src, dst) {
            Some(key) => key,
            None => {
                net_trace!("udp: no socket for {} -> {}", src, dst);
                return Err(Error::Unreachable);
            }
        };

        buf.remove_header(header_len)?;
        let checksum_field = buf.header(UDP_HEADER_LEN)
            .map(|header| udp_packet::new_unchecked(header).checksum())
            .ok_or(Error::Size)?;
        if checksum_field != 0 {
            let length = usize::from(repr.length);
            let pseudo = checksum::pseudo_header(ip.src_addr, ip.dst_addr, IpProtocol::Udp, length as u32);
            if buf.checksum16(length, pseudo, true) != 0 {
                net_debug!("udp: bad checksum from {}", src);
                return Err(Error::Broken);
            }
        }
        buf.resize(usize::from(repr.length));
        buf.remove_header(UDP_HEADER_LEN)?;

        let limit = self.queue_limit;
        let udp = self.sockets.get_mut(key).ok_or(Error::Param)?;
        if udp.queue.len() >= limit {
            net_debug!("udp: queue full, dropping from {}", src);
            return Ok(key);
        }
        net_trace!("udp: {} octets {} -> {}", buf.total_size(), src, dst);
        udp.queue.push_back((buf, src));
        udp.base.wakeup(WaitMask::READ, Ok(()));
        Ok(key)
    }

    /// Number of datagrams waiting on a socket.
    pub fn queued(&self, key: Key) -> usize {
        self.sockets.get(key).map_or(0, |udp| udp.queue.len())
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    fn get(&mut self, key: Key) -> Result<&mut Udp> {
        self.sockets.get_mut(key).ok_or(Error::Param)
    }
}

fn port_used(sockets: &SlotMap<Udp>, port: u16) -> bool {
    sockets.iter().any(|(_, udp)| udp.base.local.port == port)
}

/// Wrap `payload` into a UDP header and pass it to the IP layer.
///
/// The checksum is computed over the pseudo header with the source address the route picks when
/// `src` is unspecified.
pub(crate) fn output(cx: &mut Context, src: SockAddr, dst: SockAddr, mut payload: PktBuf) -> Result<()> {
    let src_addr = match src.addr {
        addr if !addr.is_unspecified() => addr,
        _ => cx.ip.route(dst.addr).ok_or(Error::Unreachable)?.src,
    };
    let length = payload.total_size() + UDP_HEADER_LEN;
    if length > usize::from(u16::max_value()) {
        return Err(Error::Size);
    }

    let repr = UdpRepr { src_port: src.port, dst_port: dst.port, length: length as u16 };
    payload.add_header(UDP_HEADER_LEN)?;
    repr.emit(udp_packet::new_unchecked_mut(payload.header_mut(UDP_HEADER_LEN).ok_or(Error::Size)?));
    let pseudo = checksum::pseudo_header(src_addr, dst.addr, IpProtocol::Udp, length as u32);
    let sum = udp_finish_checksum(payload.checksum16(length, pseudo, true));
    udp_packet::new_unchecked_mut(payload.header_mut(UDP_HEADER_LEN).ok_or(Error::Size)?)
        .set_checksum(sum);

    cx.ip.output(IpProtocol::Udp, src_addr, dst.addr, payload)
}

impl SockOps for Endpoint {
    fn sock(&mut self, key: Key) -> Option<&mut Sock> {
        self.sockets.get_mut(key).map(|udp| &mut udp.base)
    }

    fn close(&mut self, _: &mut Context, key: Key) -> Result<Progress<()>> {
        self.sockets.remove(key).ok_or(Error::Param)?;
        Ok(Progress::Done(()))
    }

    fn destroy(&mut self, _: &mut Context, key: Key) {
        self.sockets.remove(key);
    }

    fn bind(&mut self, cx: &mut Context, key: Key, addr: SockAddr) -> Result<()> {
        if self.get(key)?.base.local.port != 0 {
            net_debug!("udp: already bound");
            return Err(Error::Bind);
        }
        let taken = addr.port != 0 && self.sockets.iter().any(|(other, udp)| {
            let local = udp.base.local;
            other != key
                && local.port == addr.port
                && (local.addr == addr.addr || local.addr.is_unspecified() || addr.addr.is_unspecified())
        });
        if taken {
            net_debug!("udp: port {} in use", addr.port);
            return Err(Error::Bind);
        }
        self.get(key)?.base.bind(cx.ip, addr)
    }

    fn connect(&mut self, _: &mut Context, key: Key, addr: SockAddr) -> Result<Progress<()>> {
        self.get(key)?.base.connect(addr);
        Ok(Progress::Done(()))
    }

    fn send_to(&mut self, cx: &mut Context, key: Key, data: &[u8], to: SockAddr)
        -> Result<Progress<usize>>
    {
        let remote = self.get(key)?.base.remote;
        if !remote.addr.is_unspecified() && remote.addr != to.addr {
            return Err(Error::Param);
        }
        if remote.port != 0 && remote.port != to.port {
            return Err(Error::Param);
        }
        if to.addr.is_unspecified() || to.port == 0 {
            return Err(Error::Param);
        }

        if self.get(key)?.base.local.port == 0 {
            let sockets = &self.sockets;
            let port = self.ports
                .alloc(cx.config, |port| port_used(sockets, port))
                .ok_or(Error::None)?;
            net_trace!("udp: assigned port {}", port);
            self.get(key)?.base.local.port = port;
        }

        let local = self.get(key)?.base.local;
        output(cx, local, to, PktBuf::from_slice(data))?;
        Ok(Progress::Done(data.len()))
    }

    fn recv_from(&mut self, _: &mut Context, key: Key, len: usize)
        -> Result<Progress<(Vec<u8>, SockAddr)>>
    {
        let (mut buf, from) = match self.get(key)?.queue.pop_front() {
            Some(entry) => entry,
            None => return Ok(Progress::Wait),
        };
        let mut data = vec![0; len.min(buf.total_size())];
        buf.seek(0)?;
        buf.read(&mut data);
        Ok(Progress::Done((data, from)))
    }
}
