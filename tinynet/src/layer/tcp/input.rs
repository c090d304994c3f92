//! Segment input: parsing, matching a record and the receive window.
use crate::socket::{Error, Result, SockAddr, WaitMask};
use crate::storage::PktBuf;
use crate::wire::{checksum, tcp_packet, IpProtocol, TcpRepr, TcpSeqNumber as SeqNumber};
use crate::wire::TCP_HEADER_LEN;

use crate::layer::ip::Datagram;

use super::{Context, Endpoint, State, Tcp};
use super::output::send_reset;

/// A received segment, already checked.
#[derive(Debug)]
pub(super) struct Segment {
    /// Our end, the destination of the segment.
    pub local: SockAddr,
    /// The sender.
    pub remote: SockAddr,
    pub repr: TcpRepr,
    pub seq: SeqNumber,
    /// Sequence units occupied, data plus SYN and FIN.
    pub seq_len: usize,
    pub data: Vec<u8>,
}

impl Segment {
    /// Strip the IPv4 and TCP headers off a datagram, validating the checksum when one is set.
    pub(super) fn parse(datagram: &Datagram, mut buf: PktBuf) -> Result<Segment> {
        let ip = &datagram.repr;
        let ip_len = datagram.header_len;
        buf.set_cont(ip_len + TCP_HEADER_LEN)?;
        let tcp_len = {
            let header = buf.header(ip_len + TCP_HEADER_LEN).ok_or(Error::Size)?;
            usize::from(tcp_packet::new_unchecked(&header[ip_len..]).header_len())
        };
        if tcp_len < TCP_HEADER_LEN || tcp_len > ip.payload_len {
            return Err(Error::Broken);
        }
        buf.set_cont(ip_len + tcp_len)?;
        let (repr, checksum_field) = {
            let header = buf.header(ip_len + tcp_len).ok_or(Error::Size)?;
            let packet = tcp_packet::new_checked(&header[ip_len..])?;
            (TcpRepr::parse(packet)?, packet.checksum())
        };

        buf.remove_header(ip_len)?;
        if checksum_field != 0 {
            let length = buf.total_size();
            let pseudo = checksum::pseudo_header(ip.src_addr, ip.dst_addr, IpProtocol::Tcp, length as u32);
            if buf.checksum16(length, pseudo, true) != 0 {
                net_debug!("tcp: bad checksum from {}", ip.src_addr);
                return Err(Error::Broken);
            }
        }
        buf.remove_header(tcp_len)?;
        let data = buf.to_vec();

        Ok(Segment {
            local: SockAddr::new(ip.dst_addr, repr.dst_port),
            remote: SockAddr::new(ip.src_addr, repr.src_port),
            seq: repr.seq_number,
            seq_len: data.len() + repr.flags.sequence_len(),
            repr,
            data,
        })
    }
}

impl Endpoint {
    /// Feed one received datagram carrying TCP to its connection.
    ///
    /// `buf` starts with the IPv4 header. Segments for which no record exists are answered with a
    /// reset and reported as `Unreachable`. Segments outside the receive window are answered with
    /// an ACK telling the peer where we are.
    pub fn input(&mut self, cx: &mut Context, datagram: &Datagram, buf: PktBuf) -> Result<()> {
        let seg = Segment::parse(datagram, buf)?;
        net_trace!("tcp in: {} -> {} {} len={}", seg.remote, seg.local, seg.repr, seg.data.len());

        let key = match self.find(seg.local, seg.remote) {
            Some(key) => key,
            None => {
                net_debug!("tcp: no connection for {} -> {}", seg.remote, seg.local);
                if !seg.repr.flags.rst() {
                    send_reset(cx, &seg);
                }
                return Err(Error::Unreachable);
            }
        };

        let tcp = self.get(key)?;
        tcp.keepalive_restart(cx);
        if !tcp.acceptable(&seg) {
            net_debug!("tcp {}: seq {} outside the window, dropped", tcp.base.local, seg.seq);
            if !seg.repr.flags.rst() {
                tcp.send_ack(cx);
            }
            return Ok(());
        }
        self.dispatch(cx, key, &seg)
    }
}

impl Tcp {
    /// Whether a segment overlaps the receive window.
    ///
    /// Records without a synchronized peer accept everything, their handlers check on their own.
    pub(super) fn acceptable(&self, seg: &Segment) -> bool {
        match self.state {
            State::Closed | State::SynSent | State::Listen => return true,
            _ => (),
        }
        let win = self.rcv.buf.free();
        let start = self.rcv.nxt;
        let end = start + win;
        match (seg.seq_len, win) {
            (0, 0) => seg.seq == start,
            (0, _) => seg.seq.within(start, end),
            (_, 0) => false,
            (len, _) => seg.seq.within(start, end) || (seg.seq + (len - 1)).within(start, end),
        }
    }

    /// Place the payload and a FIN of an acceptable segment.
    ///
    /// Data behind a gap is stored but only becomes readable once the gap is filled by a
    /// retransmission that covers it.
    pub(super) fn data_in(&mut self, cx: &mut Context, seg: &Segment) {
        let offset = seg.seq.diff(self.rcv.nxt);
        let mut advanced = false;

        if !seg.data.is_empty() {
            if offset <= 0 {
                let skip = (-offset) as usize;
                if skip < seg.data.len() {
                    let written = self.rcv.buf.write(&seg.data[skip..]);
                    self.rcv.nxt += written;
                    advanced = written > 0;
                }
            } else {
                self.rcv.buf.write_at(offset as usize, &seg.data);
            }
        }

        if seg.repr.flags.fin() && !self.flags.fin_in && seg.seq + seg.data.len() == self.rcv.nxt {
            self.flags.fin_in = true;
            self.rcv.nxt += 1;
            advanced = true;
        }

        if advanced {
            if self.flags.fin_in {
                self.base.wakeup(WaitMask::READ, Err(Error::Closed));
            } else {
                self.base.wakeup(WaitMask::READ, Ok(()));
            }
            self.send_ack(cx);
        }
    }
}
