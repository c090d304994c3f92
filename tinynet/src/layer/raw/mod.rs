//! Raw sockets.
//!
//! A raw socket sends its payload wrapped in a bare IPv4 header carrying the socket's protocol,
//! and receives a copy of every whole datagram of that protocol, IPv4 header included. ICMP is
//! handled nowhere else, so a ping program is a raw ICMP socket.
use std::collections::VecDeque;

use crate::config::RawConfig;
use crate::managed::{Key, SlotMap};
use crate::socket::{Error, Progress, Result, SockAddr, Sock, SockOps, WaitMask};
use crate::storage::PktBuf;
use crate::wire::{IpProtocol, Ipv4Address};

use super::Context;
use super::ip::Datagram;


/// One raw socket.
#[derive(Debug)]
pub struct Raw {
    base: Sock,
    /// Received datagrams with their source.
    queue: VecDeque<(PktBuf, Ipv4Address)>,
}

/// All raw sockets.
pub struct Endpoint {
    sockets: SlotMap<Raw>,
    queue_limit: usize,
}

impl Endpoint {
    pub fn new(config: &RawConfig) -> Self {
        Endpoint {
            sockets: SlotMap::with_capacity(config.max_sockets),
            queue_limit: config.recv_queue,
        }
    }

    /// Allocate a socket for `protocol`.
    pub fn create(&mut self, protocol: IpProtocol) -> Result<Key> {
        let raw = Raw {
            base: Sock::new(protocol, WaitMask::READ),
            queue: VecDeque::new(),
        };
        self.sockets.insert(raw).ok_or_else(|| {
            net_debug!("raw: no free socket");
            Error::Memory
        })
    }

    /// Hand a copy of a received datagram to every matching socket.
    ///
    /// `buf` starts with the IPv4 header. Returns the number of sockets that took a copy.
    pub fn input(&mut self, datagram: &Datagram, buf: &PktBuf) -> usize {
        let repr = &datagram.repr;
        let limit = self.queue_limit;
        let mut delivered = 0;
        for (_, raw) in self.sockets.iter_mut() {
            let base = &mut raw.base;
            if base.protocol != repr.protocol {
                continue;
            }
            if !base.local.addr.is_unspecified() && base.local.addr != repr.dst_addr {
                continue;
            }
            if !base.remote.addr.is_unspecified() && base.remote.addr != repr.src_addr {
                continue;
            }
            if raw.queue.len() >= limit {
                net_debug!("raw: queue full, dropping from {}", repr.src_addr);
                continue;
            }
            raw.queue.push_back((buf.clone(), repr.src_addr));
            base.wakeup(WaitMask::READ, Ok(()));
            delivered += 1;
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    fn get(&mut self, key: Key) -> Result<&mut Raw> {
        self.sockets.get_mut(key).ok_or(Error::Param)
    }
}

impl SockOps for Endpoint {
    fn sock(&mut self, key: Key) -> Option<&mut Sock> {
        self.sockets.get_mut(key).map(|raw| &mut raw.base)
    }

    fn close(&mut self, _: &mut Context, key: Key) -> Result<Progress<()>> {
        self.sockets.remove(key).ok_or(Error::Param)?;
        Ok(Progress::Done(()))
    }

    fn destroy(&mut self, _: &mut Context, key: Key) {
        self.sockets.remove(key);
    }

    fn bind(&mut self, cx: &mut Context, key: Key, addr: SockAddr) -> Result<()> {
        self.get(key)?.base.bind(cx.ip, addr)
    }

    fn connect(&mut self, _: &mut Context, key: Key, addr: SockAddr) -> Result<Progress<()>> {
        self.get(key)?.base.connect(addr);
        Ok(Progress::Done(()))
    }

    fn send_to(&mut self, cx: &mut Context, key: Key, data: &[u8], to: SockAddr)
        -> Result<Progress<usize>>
    {
        let base = &self.get(key)?.base;
        if to.addr.is_unspecified() {
            return Err(Error::Param);
        }
        if !base.remote.addr.is_unspecified() && base.remote.addr != to.addr {
            return Err(Error::Param);
        }
        cx.ip.output(base.protocol, base.local.addr, to.addr, PktBuf::from_slice(data))?;
        Ok(Progress::Done(data.len()))
    }

    fn recv_from(&mut self, _: &mut Context, key: Key, len: usize)
        -> Result<Progress<(Vec<u8>, SockAddr)>>
    {
        let raw = self.get(key)?;
        let (buf, src) = match raw.queue.pop_front() {
            Some(entry) => entry,
            None => return Ok(Progress::Wait),
        };
        let mut data = buf.to_vec();
        data.truncate(len);
        Ok(Progress::Done((data, SockAddr::new(src, 0))))
    }
}
