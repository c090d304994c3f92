//! Segment output and the sending state machine.
use crate::socket::{Error, Result, SockAddr, WaitMask};
use crate::storage::PktBuf;
use crate::wire::{checksum, tcp_packet, IpProtocol, TcpFlags, TcpRepr, TcpSeqNumber as SeqNumber};

use super::{Context, OutState, Tcp, TimerEvent};
use super::input::Segment;

/// Put one segment on the wire.
///
/// The checksum covers a pseudo header built from `local` and `remote`, so neither address may
/// be unspecified.
pub(super) fn send_segment(cx: &mut Context, local: SockAddr, remote: SockAddr, repr: &TcpRepr, data: &[u8])
    -> Result<()>
{
    let header_len = repr.header_len();
    let mut buf = PktBuf::from_slice(data);
    buf.add_header(header_len)?;
    repr.emit(tcp_packet::new_unchecked_mut(buf.header_mut(header_len).ok_or(Error::Size)?));

    let length = buf.total_size();
    let pseudo = checksum::pseudo_header(local.addr, remote.addr, IpProtocol::Tcp, length as u32);
    let sum = buf.checksum16(length, pseudo, true);
    tcp_packet::new_unchecked_mut(buf.header_mut(header_len).ok_or(Error::Size)?).set_checksum(sum);

    net_trace!("tcp out: {} -> {} {} len={}", local, remote, repr, data.len());
    cx.ip.output(IpProtocol::Tcp, local.addr, remote.addr, buf)
}

/// Answer a segment nobody wants with a reset.
pub(super) fn send_reset(cx: &mut Context, seg: &Segment) {
    let (flags, seq_number, ack_number) = if seg.repr.flags.ack() {
        (TcpFlags::RST, seg.repr.ack_number, SeqNumber(0))
    } else {
        (TcpFlags::RST | TcpFlags::ACK, SeqNumber(0), seg.seq + seg.seq_len)
    };
    let repr = TcpRepr {
        src_port: seg.local.port,
        dst_port: seg.remote.port,
        flags,
        seq_number,
        ack_number,
        window_len: 0,
        max_seg_size: None,
    };
    if let Err(err) = send_segment(cx, seg.local, seg.remote, &repr, &[]) {
        net_debug!("tcp: reset to {} failed: {}", seg.remote, err);
    }
}

impl Tcp {
    fn header(&self, flags: TcpFlags, seq_number: SeqNumber) -> TcpRepr {
        TcpRepr {
            src_port: self.base.local.port,
            dst_port: self.base.remote.port,
            flags,
            seq_number,
            ack_number: self.rcv.nxt,
            window_len: self.window(),
            max_seg_size: None,
        }
    }

    fn send(&self, cx: &mut Context, repr: &TcpRepr, data: &[u8]) {
        if let Err(err) = send_segment(cx, self.base.local, self.base.remote, repr, data) {
            net_debug!("tcp {}: send failed: {}", self.base.local, err);
        }
    }

    /// The flags and header of a segment carrying our SYN.
    fn syn_header(&self, seq_number: SeqNumber) -> TcpRepr {
        let mut flags = TcpFlags::SYN;
        flags.set_ack(self.flags.irs_valid);
        let mut repr = self.header(flags, seq_number);
        repr.max_seg_size = Some(self.mss.min(usize::from(u16::max_value())) as u16);
        repr
    }

    /// Send the next segment of new data, SYN or FIN, if there is one.
    ///
    /// Returns whether a segment went out.
    pub(super) fn transmit(&mut self, cx: &mut Context) -> bool {
        let in_flight = self.snd.nxt.distance_from(self.snd.una);
        let syn_units = (self.flags.syn_out && in_flight > 0) as usize;
        let buffered = self.snd.buf.len();
        let data_sent = (in_flight - syn_units).min(buffered);
        let fin_sent = self.flags.fin_out && in_flight - syn_units > buffered;

        let syn = self.flags.syn_out && in_flight == 0;
        let dlen = (buffered - data_sent).min(self.mss);
        let fin = self.flags.fin_out && !fin_sent && data_sent + dlen == buffered;
        let seq_len = dlen + syn as usize + fin as usize;
        if seq_len == 0 {
            return false;
        }

        let mut repr = if syn {
            self.syn_header(self.snd.nxt)
        } else {
            let mut flags = TcpFlags::default();
            flags.set_ack(self.flags.irs_valid);
            self.header(flags, self.snd.nxt)
        };
        repr.flags.set_fin(fin);
        repr.flags.set_psh(dlen > 0);
        let mut data = vec![0; dlen];
        self.snd.buf.peek(data_sent, &mut data);
        self.send(cx, &repr, &data);
        self.snd.nxt += seq_len;
        true
    }

    /// Send the oldest unacknowledged segment again.
    pub(super) fn retransmit(&mut self, cx: &mut Context) {
        let buffered = self.snd.buf.len();
        let dlen = buffered.min(self.mss);
        let syn = self.flags.syn_out;
        let fin = self.flags.fin_out && dlen == buffered;
        let seq_len = dlen + syn as usize + fin as usize;
        if seq_len == 0 {
            return;
        }

        let mut repr = if syn {
            self.syn_header(self.snd.una)
        } else {
            let mut flags = TcpFlags::default();
            flags.set_ack(self.flags.irs_valid);
            self.header(flags, self.snd.una)
        };
        repr.flags.set_fin(fin);
        repr.flags.set_psh(dlen > 0);
        let mut data = vec![0; dlen];
        self.snd.buf.peek(0, &mut data);
        net_debug!("tcp {}: retransmit seq={} len={}", self.base.local, self.snd.una, seq_len);
        self.send(cx, &repr, &data);

        let end = self.snd.una + seq_len;
        if end.after(self.snd.nxt) {
            self.snd.nxt = end;
        }
    }

    pub(super) fn send_syn(&mut self, cx: &mut Context) {
        self.flags.syn_out = true;
        self.out_event(cx);
    }

    pub(super) fn send_fin(&mut self, cx: &mut Context) {
        self.flags.fin_out = true;
        self.out_event(cx);
    }

    pub(super) fn send_ack(&self, cx: &mut Context) {
        let repr = self.header(TcpFlags::ACK, self.snd.nxt);
        self.send(cx, &repr, &[]);
    }

    /// An empty segment one below the send sequence, which the peer has to acknowledge.
    pub(super) fn send_keepalive(&self, cx: &mut Context) {
        let repr = self.header(TcpFlags::ACK, self.snd.nxt - 1);
        self.send(cx, &repr, &[]);
    }

    /// Reset our own connection.
    pub(super) fn send_reset_for_tcp(&self, cx: &mut Context) {
        let repr = self.header(TcpFlags::RST | TcpFlags::ACK, self.snd.nxt);
        self.send(cx, &repr, &[]);
    }

    /// Account for the acknowledgement of `seg`.
    ///
    /// Duplicates are ignored. An acknowledgement of something never sent is an error.
    pub(super) fn ack_process(&mut self, seg: &Segment) -> Result<()> {
        if !seg.repr.flags.ack() {
            return Ok(());
        }
        let ack = seg.repr.ack_number;
        if ack.before_eq(self.snd.una) {
            return Ok(());
        }
        if ack.after(self.snd.nxt) {
            net_debug!("tcp {}: ack {} beyond {}", self.base.local, ack, self.snd.nxt);
            return Err(Error::Unreachable);
        }

        let mut acked = ack.distance_from(self.snd.una);
        if self.flags.syn_out {
            self.flags.syn_out = false;
            acked -= 1;
        }
        self.snd.una = ack;
        if acked > 0 {
            let removed = self.snd.buf.remove(acked);
            if self.flags.fin_out && acked > removed {
                self.flags.fin_out = false;
            }
            self.base.wakeup(WaitMask::WRITE, Ok(()));
        }
        Ok(())
    }

    /// Switch the sending state, re-arming or stopping the retransmission timer.
    pub(super) fn set_ostate(&mut self, cx: &mut Context, state: OutState) {
        self.snd.ostate = state;
        let event = TimerEvent::Retransmit(self.key);
        match state {
            OutState::Idle => {
                self.snd.rto = cx.config.tcp.initial_rto;
                cx.timers.remove(&event);
            }
            OutState::Sending | OutState::Rexmit => {
                cx.timers.add("tcp rexmit", event, self.snd.rto, false);
            }
        }
    }

    /// Something may be ready to send, new data or a FIN was queued or an ACK arrived.
    pub(super) fn out_event(&mut self, cx: &mut Context) {
        match self.snd.ostate {
            OutState::Idle => {
                if self.transmit(cx) {
                    self.set_ostate(cx, OutState::Sending);
                }
            }
            OutState::Sending | OutState::Rexmit => {
                let drained = self.snd.una == self.snd.nxt;
                if drained || self.flags.fin_out {
                    if self.transmit(cx) || self.snd.una != self.snd.nxt {
                        self.set_ostate(cx, OutState::Sending);
                    } else {
                        self.set_ostate(cx, OutState::Idle);
                    }
                } else if self.snd.ostate == OutState::Rexmit {
                    self.set_ostate(cx, OutState::Rexmit);
                    self.retransmit(cx);
                }
            }
        }
    }

    /// The retransmission timer expired. Returns `true` when the connection has to be aborted.
    pub(super) fn retransmit_timeout(&mut self, cx: &mut Context) -> bool {
        if self.snd.una == self.snd.nxt {
            self.set_ostate(cx, OutState::Idle);
            return false;
        }
        match self.snd.ostate {
            OutState::Idle => return false,
            OutState::Sending => self.snd.rexmit_cnt = 1,
            OutState::Rexmit => {
                self.snd.rexmit_cnt += 1;
                if self.snd.rexmit_cnt > self.snd.rexmit_max {
                    net_warn!("tcp {}: giving up after {} retransmissions",
                        self.base.local, self.snd.rexmit_max);
                    return true;
                }
            }
        }
        self.retransmit(cx);
        self.snd.rto = (self.snd.rto * 2).min(cx.config.tcp.max_rto);
        self.set_ostate(cx, OutState::Rexmit);
        false
    }

    /// The keepalive timer expired. Returns `true` when the peer is considered gone.
    pub(super) fn keepalive_timeout(&mut self, cx: &mut Context) -> bool {
        self.keep.retry += 1;
        if self.keep.retry <= self.keep.probes {
            net_trace!("tcp {}: keepalive probe {}", self.base.local, self.keep.retry);
            self.keepalive_arm(cx, self.keep.interval);
            self.send_keepalive(cx);
            false
        } else {
            net_debug!("tcp {}: keepalive gave up", self.base.local);
            self.send_reset_for_tcp(cx);
            true
        }
    }
}
