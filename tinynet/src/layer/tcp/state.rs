//! The receive state machine, one handler per connection state.
//!
//! Every handler gets a segment that already passed the window check. Handlers that end the
//! connection go through `Endpoint::abort`, which also frees records nobody holds anymore.
use crate::managed::Key;
use crate::socket::{Error, Result, WaitMask};

use super::{Context, Endpoint, OutState, State, Tcp};
use super::input::Segment;
use super::output::send_reset;

impl Endpoint {
    pub(super) fn dispatch(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        let state = self.get(key)?.state;
        match state {
            State::Closed => {
                if !seg.repr.flags.rst() {
                    send_reset(cx, seg);
                }
                Ok(())
            }
            State::Listen => self.listen_in(cx, key, seg),
            State::SynSent => self.syn_sent_in(cx, key, seg),
            State::SynReceived => self.syn_received_in(cx, key, seg),
            State::Established => self.established_in(cx, key, seg),
            State::FinWait1 => self.fin_wait_1_in(cx, key, seg),
            State::FinWait2 => self.fin_wait_2_in(cx, key, seg),
            State::Closing => self.closing_in(cx, key, seg),
            State::TimeWait => self.time_wait_in(cx, key, seg),
            State::CloseWait => self.close_wait_in(cx, key, seg),
            State::LastAck => self.last_ack_in(cx, key, seg),
        }
    }

    /// Handle RST and SYN of a synchronized connection. Returns `true` if it was aborted.
    fn reset_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> bool {
        let flags = seg.repr.flags;
        if flags.rst() {
            self.abort(cx, key, Error::Reset);
            true
        } else if flags.syn() {
            send_reset(cx, seg);
            self.abort(cx, key, Error::Reset);
            true
        } else {
            false
        }
    }

    /// Process the acknowledgement of a synchronized connection.
    ///
    /// Returns `true` if the segment acknowledged something never sent, it is answered with an
    /// ACK and dropped.
    fn ack_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<bool> {
        let tcp = self.get(key)?;
        match tcp.ack_process(seg) {
            Ok(()) => Ok(false),
            Err(_) => {
                tcp.send_ack(cx);
                Ok(true)
            }
        }
    }

    /// Allocate the record of a passively opened connection.
    fn create_child(&mut self, cx: &mut Context, parent: Key, seg: &Segment) -> Result<Key> {
        let key = self.alloc(cx)?;
        let iss = self.next_iss();
        let tcp = self.get(key)?;
        tcp.base.local = seg.local;
        tcp.base.remote = seg.remote;
        tcp.init_connect(cx, iss);
        tcp.rcv.iss = seg.seq;
        tcp.rcv.nxt = seg.seq + 1;
        tcp.flags.irs_valid = true;
        tcp.peer_mss(seg);
        tcp.parent = Some(parent);
        tcp.flags.inactive = true;
        Ok(key)
    }

    fn listen_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        let flags = seg.repr.flags;
        if flags.rst() {
            return Ok(());
        }
        if flags.ack() {
            send_reset(cx, seg);
            return Ok(());
        }
        if !flags.syn() {
            return Ok(());
        }

        let backlog = self.get(key)?.backlog;
        if self.backlog_count(key) >= backlog {
            net_debug!("tcp {}: backlog of {} full", seg.local, backlog);
            return Err(Error::Full);
        }
        let child = self.create_child(cx, key, seg)?;
        let tcp = self.get(child)?;
        tcp.set_state(State::SynReceived);
        tcp.send_syn(cx);
        Ok(())
    }

    fn syn_sent_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        let flags = seg.repr.flags;
        if flags.ack() {
            let tcp = self.get(key)?;
            let ack = seg.repr.ack_number;
            if ack.before_eq(tcp.snd.iss) || ack.after(tcp.snd.nxt) {
                net_debug!("tcp {}: unexpected ack {} in SYN-SENT", tcp.base.local, ack);
                if !flags.rst() {
                    send_reset(cx, seg);
                }
                return Err(Error::Unreachable);
            }
        }
        if flags.rst() {
            if flags.ack() {
                self.abort(cx, key, Error::Reset);
            }
            return Ok(());
        }
        if !flags.syn() {
            return Ok(());
        }

        let tcp = self.get(key)?;
        tcp.rcv.iss = seg.seq;
        tcp.rcv.nxt = seg.seq + 1;
        tcp.flags.irs_valid = true;
        tcp.peer_mss(seg);
        if flags.ack() {
            tcp.ack_process(seg)?;
            tcp.set_ostate(cx, OutState::Idle);
        }

        if tcp.snd.una.after(tcp.snd.iss) {
            tcp.set_state(State::Established);
            tcp.send_ack(cx);
            tcp.base.wakeup(WaitMask::CONN, Ok(()));
        } else {
            // Simultaneous open.
            tcp.set_state(State::SynReceived);
            tcp.send_syn(cx);
        }
        Ok(())
    }

    fn syn_received_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) {
            return Ok(());
        }
        let tcp = self.get(key)?;
        if !seg.repr.flags.ack() {
            return Ok(());
        }
        if tcp.ack_process(seg).is_err() {
            send_reset(cx, seg);
            return Err(Error::Unreachable);
        }
        if tcp.flags.syn_out {
            return Ok(());
        }

        tcp.out_event(cx);
        tcp.set_state(State::Established);
        tcp.base.wakeup(WaitMask::CONN, Ok(()));
        // The handshake ACK may already carry data or even a FIN.
        tcp.data_in(cx, seg);
        if tcp.flags.fin_in {
            tcp.set_state(State::CloseWait);
        }

        let parent = tcp.parent;
        if let Some(parent) = parent {
            if let Some(listener) = self.sockets.get_mut(parent) {
                listener.base.wakeup(WaitMask::CONN, Ok(()));
            }
        }
        Ok(())
    }

    fn established_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) || self.ack_in(cx, key, seg)? {
            return Ok(());
        }
        let tcp = self.get(key)?;
        tcp.data_in(cx, seg);
        tcp.out_event(cx);
        if tcp.flags.fin_in {
            tcp.set_state(State::CloseWait);
        }
        Ok(())
    }

    fn fin_wait_1_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) || self.ack_in(cx, key, seg)? {
            return Ok(());
        }
        let tcp = self.get(key)?;
        tcp.data_in(cx, seg);
        tcp.out_event(cx);
        if !tcp.flags.fin_out {
            if tcp.flags.fin_in {
                tcp.time_wait(cx);
            } else {
                tcp.set_state(State::FinWait2);
            }
        } else if tcp.flags.fin_in {
            tcp.set_state(State::Closing);
        }
        Ok(())
    }

    fn fin_wait_2_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) || self.ack_in(cx, key, seg)? {
            return Ok(());
        }
        let tcp = self.get(key)?;
        tcp.data_in(cx, seg);
        if tcp.flags.fin_in {
            tcp.time_wait(cx);
        }
        Ok(())
    }

    fn closing_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) || self.ack_in(cx, key, seg)? {
            return Ok(());
        }
        let tcp = self.get(key)?;
        tcp.out_event(cx);
        if !tcp.flags.fin_out {
            tcp.time_wait(cx);
        }
        Ok(())
    }

    fn time_wait_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) || self.ack_in(cx, key, seg)? {
            return Ok(());
        }
        // A retransmitted FIN, our ACK got lost.
        let tcp = self.get(key)?;
        if seg.repr.flags.fin() {
            tcp.send_ack(cx);
            tcp.time_wait(cx);
        }
        Ok(())
    }

    fn close_wait_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) || self.ack_in(cx, key, seg)? {
            return Ok(());
        }
        self.get(key)?.out_event(cx);
        Ok(())
    }

    fn last_ack_in(&mut self, cx: &mut Context, key: Key, seg: &Segment) -> Result<()> {
        if self.reset_in(cx, key, seg) || self.ack_in(cx, key, seg)? {
            return Ok(());
        }
        let tcp = self.get(key)?;
        tcp.out_event(cx);
        if !tcp.flags.fin_out {
            tcp.abort(cx, Error::Closed);
            self.free(cx, key);
        }
        Ok(())
    }
}

impl Tcp {
    /// Lower the segment size to what the peer announced.
    fn peer_mss(&mut self, seg: &Segment) {
        match seg.repr.max_seg_size {
            Some(mss) if mss > 0 => self.mss = self.mss.min(usize::from(mss)),
            _ => (),
        }
    }
}
