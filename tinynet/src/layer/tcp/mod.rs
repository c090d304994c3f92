//! The TCP layer.
//!
//! Connection records live in one fixed-size arena owned by the [`Endpoint`]. Every record is
//! named by a generation-checked [`Key`], which is also what timers and child connections use to
//! refer back to it. A key outliving its record simply fails to resolve, so there are no dangling
//! references when a record is freed underneath an armed timer or a listener.
//!
//! [`Endpoint`]: struct.Endpoint.html
//! [`Key`]: ../../managed/struct.Key.html
//!
//! ## Structure
//!
//! The receive side is a state machine with one handler per [`State`], see `state.rs`. Each
//! inbound segment is checked, matched to a record and then checked against the receive window
//! before its handler runs. Segments failing any check are dropped without touching the record.
//!
//! The send side has a second, much smaller state machine: idle, sending and retransmitting. It
//! keeps at most one segment of new data outstanding and retransmits it with a doubling timeout.
//! There is no congestion control, no selective acknowledgement and no window scaling.
//!
//! [`State`]: enum.State.html
//!
//! ## Lifetime of a record
//!
//! A record is allocated by `create` or, for passive opens, by a listener receiving a SYN. A
//! child stays *inactive* until it was handed out by `accept`. Closing is split in two: `close`
//! starts the state machine on its way and `destroy` releases the record once the application
//! is done with it. Records reaching `TIME_WAIT` are kept until twice the maximum segment
//! lifetime has passed, or until their slot is needed for a new connection.
use core::fmt;

use crate::config::{Config, TcpConfig};
use crate::managed::{Key, SlotMap};
use crate::socket::{Error, Progress, Result, Sock, SockAddr, SockOps, SockOpt, WaitMask};
use crate::storage::RingBuffer;
use crate::wire::{IpProtocol, TcpSeqNumber as SeqNumber};

use super::{Context, PortAllocator, TimerEvent};

mod input;
mod output;
mod state;

#[cfg(test)]
mod tests;

/// The connection states of RFC 793.
///
/// A free record is not represented, it is simply absent from the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
}

/// The state of the sending side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutState {
    /// Nothing outstanding, no timer.
    Idle,
    /// A segment is in flight and the retransmission timer runs.
    Sending,
    /// The timer expired at least once.
    Rexmit,
}

#[derive(Clone, Copy, Debug, Default)]
struct Flags {
    /// Our SYN occupies the first sequence unit and is not yet acknowledged.
    syn_out: bool,
    /// Our FIN was queued and is not yet acknowledged.
    fin_out: bool,
    /// The peer's FIN was received.
    fin_in: bool,
    /// The peer's initial sequence number is known.
    irs_valid: bool,
    keep_enable: bool,
    /// No application holds the record. Either a passively opened connection not yet returned by
    /// `accept` or one released while in `TIME_WAIT`.
    inactive: bool,
}

#[derive(Debug)]
struct Keepalive {
    /// Idle seconds before the first probe.
    idle: u32,
    /// Seconds between probes.
    interval: u32,
    /// Probes before giving up.
    probes: u32,
    /// Probes sent since the peer was last heard of.
    retry: u32,
}

#[derive(Debug)]
struct SendSide {
    /// Unacknowledged and unsent data, starting at `una`.
    buf: RingBuffer,
    /// Oldest unacknowledged sequence number.
    una: SeqNumber,
    /// Next sequence number to send.
    nxt: SeqNumber,
    iss: SeqNumber,
    ostate: OutState,
    rexmit_cnt: u32,
    rexmit_max: u32,
    /// Current retransmission timeout in milliseconds.
    rto: u64,
}

#[derive(Debug)]
struct RecvSide {
    buf: RingBuffer,
    /// Next sequence number expected from the peer.
    nxt: SeqNumber,
    iss: SeqNumber,
}

/// One connection record.
#[derive(Debug)]
pub struct Tcp {
    base: Sock,
    key: Key,
    state: State,
    mss: usize,
    flags: Flags,
    /// The listener this connection was accepted on.
    parent: Option<Key>,
    backlog: usize,
    keep: Keepalive,
    snd: SendSide,
    rcv: RecvSide,
}

/// All TCP connections.
pub struct Endpoint {
    sockets: SlotMap<Tcp>,
    ports: PortAllocator,
    /// The last initial sequence number handed out.
    iss: u32,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Closed => "CLOSED",
            State::Listen => "LISTEN",
            State::SynSent => "SYN-SENT",
            State::SynReceived => "SYN-RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN-WAIT-1",
            State::FinWait2 => "FIN-WAIT-2",
            State::Closing => "CLOSING",
            State::TimeWait => "TIME-WAIT",
            State::CloseWait => "CLOSE-WAIT",
            State::LastAck => "LAST-ACK",
        };
        f.write_str(name)
    }
}

impl Tcp {
    fn new(key: Key, config: &TcpConfig) -> Self {
        Tcp {
            base: Sock::new(IpProtocol::Tcp, WaitMask::ALL),
            key,
            state: State::Closed,
            mss: usize::from(config.default_mss),
            flags: Flags::default(),
            parent: None,
            backlog: 0,
            keep: Keepalive {
                idle: config.keepalive_idle,
                interval: config.keepalive_interval,
                probes: config.keepalive_probes,
                retry: 0,
            },
            snd: SendSide {
                buf: RingBuffer::new(config.send_buffer),
                una: SeqNumber::default(),
                nxt: SeqNumber::default(),
                iss: SeqNumber::default(),
                ostate: OutState::Idle,
                rexmit_cnt: 0,
                rexmit_max: config.retries,
                rto: config.initial_rto,
            },
            rcv: RecvSide {
                buf: RingBuffer::new(config.recv_buffer),
                nxt: SeqNumber::default(),
                iss: SeqNumber::default(),
            },
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        net_debug!("tcp {}: {} -> {}", self.base.local, self.state, state);
        self.state = state;
    }

    /// Prepare both directions for a new connection starting at `iss`.
    ///
    /// The segment size follows the MTU of the route to the peer, unless it is unknown or the
    /// peer sits behind a gateway.
    fn init_connect(&mut self, cx: &Context, iss: SeqNumber) {
        self.mss = match cx.ip.route(self.base.remote.addr) {
            Some(route) if route.mtu > 40 && !route.via_gateway => route.mtu - 40,
            _ => usize::from(cx.config.tcp.default_mss),
        };
        self.snd.buf.clear();
        self.rcv.buf.clear();
        self.snd.iss = iss;
        self.snd.una = iss;
        self.snd.nxt = iss;
        self.rcv.iss = SeqNumber(0);
    }

    /// Advertised receive window.
    fn window(&self) -> u16 {
        self.rcv.buf.free().min(usize::from(u16::max_value())) as u16
    }

    fn kill_timers(&self, cx: &mut Context) {
        cx.timers.remove(&TimerEvent::Retransmit(self.key));
        cx.timers.remove(&TimerEvent::Keepalive(self.key));
        cx.timers.remove(&TimerEvent::TimeWait(self.key));
    }

    /// Drop the connection, waking every waiter with `err`.
    fn abort(&mut self, cx: &mut Context, err: Error) {
        net_debug!("tcp {}: abort ({})", self.base.local, err);
        self.kill_timers(cx);
        self.set_state(State::Closed);
        self.base.wakeup(WaitMask::ALL, Err(err));
    }

    /// Enter `TIME_WAIT`, the record is freed by the timer armed here.
    fn time_wait(&mut self, cx: &mut Context) {
        self.set_state(State::TimeWait);
        self.kill_timers(cx);
        cx.timers.add("tcp 2msl", TimerEvent::TimeWait(self.key), 2 * cx.config.tcp.msl, false);
        self.base.wakeup(WaitMask::ALL, Err(Error::Closed));
    }

    fn keepalive_arm(&self, cx: &mut Context, secs: u32) {
        cx.timers.add("tcp keepalive", TimerEvent::Keepalive(self.key), u64::from(secs) * 1000, false);
    }

    fn keepalive_start(&mut self, cx: &mut Context, run: bool) {
        if self.flags.keep_enable && !run {
            cx.timers.remove(&TimerEvent::Keepalive(self.key));
        } else if run && !self.flags.keep_enable {
            self.keepalive_arm(cx, self.keep.idle);
        }
        self.flags.keep_enable = run;
    }

    /// The peer was heard of, start counting idle time anew.
    fn keepalive_restart(&mut self, cx: &mut Context) {
        if self.flags.keep_enable {
            self.keepalive_arm(cx, self.keep.idle);
            self.keep.retry = 0;
        }
    }
}

impl Endpoint {
    pub fn new(config: &Config) -> Self {
        Endpoint {
            sockets: SlotMap::with_capacity(config.tcp.max_sockets),
            ports: PortAllocator::new(config),
            iss: 0,
        }
    }

    /// Allocate a closed record.
    pub fn create(&mut self, cx: &mut Context) -> Result<Key> {
        self.alloc(cx)
    }

    /// Allocate a record, sacrificing one in `TIME_WAIT` when the arena is full.
    fn alloc(&mut self, cx: &mut Context) -> Result<Key> {
        if self.sockets.is_full() {
            let victim = self.sockets.iter()
                .find(|(_, tcp)| tcp.state == State::TimeWait)
                .map(|(key, _)| key);
            match victim {
                Some(key) => {
                    net_debug!("tcp: reclaiming a TIME-WAIT record");
                    self.free(cx, key);
                }
                None => {
                    net_debug!("tcp: no free record");
                    return Err(Error::Memory);
                }
            }
        }
        let config = &cx.config.tcp;
        self.sockets.insert_with(|key| Tcp::new(key, config)).ok_or(Error::Memory)
    }

    /// Release a record and everything armed for it.
    fn free(&mut self, cx: &mut Context, key: Key) {
        if let Some(tcp) = self.sockets.remove(key) {
            tcp.kill_timers(cx);
        }
    }

    /// Abort a connection, releasing it when no application holds it.
    fn abort(&mut self, cx: &mut Context, key: Key, err: Error) {
        let inactive = match self.sockets.get_mut(key) {
            Some(tcp) => {
                tcp.abort(cx, err);
                tcp.flags.inactive
            }
            None => return,
        };
        if inactive {
            self.free(cx, key);
        }
    }

    fn next_iss(&mut self) -> SeqNumber {
        self.iss = self.iss.wrapping_add(1);
        SeqNumber(self.iss)
    }

    /// The record a segment from `remote` to `local` belongs to.
    ///
    /// A connection matching both ends wins. Otherwise a listener on the port is chosen, one
    /// bound to exactly `local` before one bound to any address.
    fn find(&self, local: SockAddr, remote: SockAddr) -> Option<Key> {
        let mut listener = None;
        for (key, tcp) in self.sockets.iter() {
            let base = &tcp.base;
            if base.local.port != local.port {
                continue;
            }
            if base.remote == remote
                && (base.local.addr.is_unspecified() || base.local.addr == local.addr)
            {
                return Some(key);
            }
            if tcp.state == State::Listen {
                if base.local.addr == local.addr {
                    listener = Some(key);
                } else if base.local.addr.is_unspecified() && listener.is_none() {
                    listener = Some(key);
                }
            }
        }
        listener
    }

    /// Children of `parent` waiting to be accepted.
    fn backlog_count(&self, parent: Key) -> usize {
        self.sockets.iter()
            .filter(|(_, tcp)| tcp.parent == Some(parent) && tcp.flags.inactive)
            .count()
    }

    /// Handle an expired timer of this layer.
    pub fn on_timer(&mut self, cx: &mut Context, event: TimerEvent) {
        match event {
            TimerEvent::Retransmit(key) => {
                let expired = match self.sockets.get_mut(key) {
                    Some(tcp) => tcp.retransmit_timeout(cx),
                    None => return,
                };
                if expired {
                    self.abort(cx, key, Error::Timeout);
                }
            }
            TimerEvent::Keepalive(key) => {
                let expired = match self.sockets.get_mut(key) {
                    Some(tcp) => tcp.keepalive_timeout(cx),
                    None => return,
                };
                if expired {
                    self.abort(cx, key, Error::Closed);
                }
            }
            TimerEvent::TimeWait(key) => {
                net_debug!("tcp: TIME-WAIT over");
                self.free(cx, key);
            }
            TimerEvent::DnsUpdate => (),
        }
    }

    /// The state of a record, `None` once it was freed.
    pub fn state(&self, key: Key) -> Option<State> {
        self.sockets.get(key).map(Tcp::state)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    fn get(&mut self, key: Key) -> Result<&mut Tcp> {
        self.sockets.get_mut(key).ok_or(Error::Param)
    }
}

impl SockOps for Endpoint {
    fn sock(&mut self, key: Key) -> Option<&mut Sock> {
        self.sockets.get_mut(key).map(|tcp| &mut tcp.base)
    }

    fn close(&mut self, cx: &mut Context, key: Key) -> Result<Progress<()>> {
        let state = self.get(key)?.state;
        match state {
            State::Closed => {
                self.free(cx, key);
                Ok(Progress::Done(()))
            }
            State::Listen => {
                let children: Vec<(Key, bool)> = self.sockets.iter()
                    .filter(|(_, child)| child.parent == Some(key))
                    .map(|(child, tcp)| (child, tcp.flags.inactive))
                    .collect();
                for (child, inactive) in children {
                    if inactive {
                        self.abort(cx, child, Error::Closed);
                    } else if let Some(tcp) = self.sockets.get_mut(child) {
                        tcp.parent = None;
                    }
                }
                self.get(key)?.abort(cx, Error::Closed);
                self.free(cx, key);
                Ok(Progress::Done(()))
            }
            State::SynSent | State::SynReceived => {
                self.get(key)?.abort(cx, Error::Closed);
                self.free(cx, key);
                Ok(Progress::Done(()))
            }
            State::Established => {
                let tcp = self.get(key)?;
                tcp.send_fin(cx);
                tcp.set_state(State::FinWait1);
                Ok(Progress::Wait)
            }
            State::CloseWait => {
                let tcp = self.get(key)?;
                tcp.send_fin(cx);
                tcp.set_state(State::LastAck);
                Ok(Progress::Wait)
            }
            _ => {
                net_debug!("tcp: close in {}", state);
                Err(Error::State)
            }
        }
    }

    fn destroy(&mut self, cx: &mut Context, key: Key) {
        match self.sockets.get_mut(key) {
            // Lingers until the 2MSL timer or a reset, whichever is first.
            Some(tcp) if tcp.state == State::TimeWait => {
                tcp.flags.inactive = true;
                tcp.parent = None;
            }
            Some(_) => self.free(cx, key),
            None => (),
        }
    }

    fn bind(&mut self, cx: &mut Context, key: Key, addr: SockAddr) -> Result<()> {
        let tcp = self.get(key)?;
        if tcp.state != State::Closed {
            return Err(Error::State);
        }
        if tcp.base.local.port != 0 || addr.port == 0 {
            return Err(Error::Param);
        }
        if !addr.addr.is_unspecified() && !cx.ip.is_local(addr.addr) {
            net_debug!("tcp: {} is not ours", addr.addr);
            return Err(Error::Address);
        }
        // Only unconnected records, i.e. listeners, hold a port exclusively.
        let taken = self.sockets.iter().any(|(other, tcp)| {
            other != key
                && tcp.base.remote.port == 0
                && tcp.base.local == addr
        });
        if taken {
            net_debug!("tcp: {} already bound", addr);
            return Err(Error::Address);
        }
        self.get(key)?.base.local = addr;
        Ok(())
    }

    fn connect(&mut self, cx: &mut Context, key: Key, addr: SockAddr) -> Result<Progress<()>> {
        if self.get(key)?.state != State::Closed {
            return Err(Error::State);
        }
        if addr.addr.is_unspecified() || addr.port == 0 {
            return Err(Error::Param);
        }

        if self.get(key)?.base.local.port == 0 {
            let sockets = &self.sockets;
            let port = self.ports
                .alloc(cx.config, |port| sockets.iter().any(|(_, tcp)| tcp.base.local.port == port))
                .ok_or(Error::None)?;
            self.get(key)?.base.local.port = port;
        }
        if self.get(key)?.base.local.addr.is_unspecified() {
            let route = cx.ip.route(addr.addr).ok_or_else(|| {
                net_debug!("tcp: no route to {}", addr.addr);
                Error::Unreachable
            })?;
            self.get(key)?.base.local.addr = route.src;
        }

        let iss = self.next_iss();
        let tcp = self.get(key)?;
        tcp.base.remote = addr;
        tcp.init_connect(cx, iss);
        tcp.send_syn(cx);
        tcp.set_state(State::SynSent);
        Ok(Progress::Wait)
    }

    fn listen(&mut self, _: &mut Context, key: Key, backlog: usize) -> Result<()> {
        let tcp = self.get(key)?;
        if tcp.state != State::Closed {
            return Err(Error::State);
        }
        tcp.set_state(State::Listen);
        tcp.backlog = backlog;
        Ok(())
    }

    fn accept(&mut self, _: &mut Context, key: Key) -> Result<Progress<(Key, SockAddr)>> {
        if self.get(key)?.state != State::Listen {
            return Err(Error::State);
        }
        let ready = self.sockets.iter_mut().find(|(_, child)| {
            child.parent == Some(key)
                && child.flags.inactive
                && matches!(child.state, State::Established | State::CloseWait)
        });
        match ready {
            Some((child, tcp)) => {
                tcp.flags.inactive = false;
                Ok(Progress::Done((child, tcp.base.remote)))
            }
            None => Ok(Progress::Wait),
        }
    }

    fn send(&mut self, cx: &mut Context, key: Key, data: &[u8]) -> Result<Progress<usize>> {
        let tcp = self.get(key)?;
        match tcp.state {
            State::Established | State::CloseWait => (),
            State::Closed
            | State::FinWait1
            | State::FinWait2
            | State::TimeWait
            | State::LastAck
            | State::Closing => return Err(Error::Closed),
            State::Listen | State::SynSent | State::SynReceived => return Err(Error::State),
        }
        let written = tcp.snd.buf.write(data);
        if written == 0 && !data.is_empty() {
            return Ok(Progress::Wait);
        }
        tcp.out_event(cx);
        Ok(Progress::Done(written))
    }

    fn recv_from(&mut self, _: &mut Context, key: Key, len: usize)
        -> Result<Progress<(Vec<u8>, SockAddr)>>
    {
        let tcp = self.get(key)?;
        let at_end = match tcp.state {
            State::LastAck | State::Closed => return Err(Error::Closed),
            State::CloseWait | State::Closing | State::TimeWait => true,
            State::Established | State::FinWait1 | State::FinWait2 => false,
            State::Listen | State::SynSent | State::SynReceived => return Err(Error::State),
        };
        if tcp.rcv.buf.is_empty() {
            return if at_end { Err(Error::Closed) } else { Ok(Progress::Wait) };
        }
        let mut data = vec![0; len.min(tcp.rcv.buf.len())];
        tcp.rcv.buf.read(&mut data);
        Ok(Progress::Done((data, tcp.base.remote)))
    }

    fn setopt(&mut self, cx: &mut Context, key: Key, opt: SockOpt) -> Result<()> {
        let tcp = self.get(key)?;
        match opt {
            SockOpt::RecvTimeout(_) | SockOpt::SendTimeout(_) => return tcp.base.setopt(opt),
            SockOpt::KeepAlive(run) => {
                tcp.keepalive_start(cx, run);
                return Ok(());
            }
            SockOpt::KeepIdle(secs) => tcp.keep.idle = secs,
            SockOpt::KeepInterval(secs) => tcp.keep.interval = secs,
            SockOpt::KeepCount(count) => tcp.keep.probes = count,
        }
        tcp.keepalive_restart(cx);
        Ok(())
    }
}
