use core::time::Duration;

use crate::config::Config;
use crate::layer::{dns, ip, raw, tcp, udp, Context, TimerEvent};
use crate::managed::Key;
use crate::storage::PktBuf;
use crate::time::Instant;
use crate::timer::Timers;
use crate::wire::IpProtocol;

use super::{Error, Fd, Handle, HandleTable, Progress, Result, SockKind, SockOps, SockType, WaitMask};
use super::{Reply, Request, Response};

/// Everything the engine owns.
///
/// A stack is driven from one thread at a time by three entry points: [`execute`] runs one
/// request from an application, [`poll`] takes received datagrams off the devices and [`advance`]
/// moves the clock forward and fires timers. None of them ever blocks.
///
/// [`execute`]: #method.execute
/// [`poll`]: #method.poll
/// [`advance`]: #method.advance
pub struct Stack {
    config: Config,
    ip: ip::Endpoint,
    timers: Timers<TimerEvent>,
    raw: raw::Endpoint,
    udp: udp::Endpoint,
    tcp: tcp::Endpoint,
    dns: dns::Endpoint,
    handles: HandleTable,
    /// When timers were last checked.
    now: Instant,
}

impl Stack {
    pub fn new(config: Config) -> Self {
        let mut timers = Timers::new();
        let period = u64::from(config.dns.update_period) * 1000;
        if period > 0 {
            timers.add("dns update", TimerEvent::DnsUpdate, period, true);
        }
        Stack {
            ip: ip::Endpoint::new(),
            raw: raw::Endpoint::new(&config.raw),
            udp: udp::Endpoint::new(&config),
            tcp: tcp::Endpoint::new(&config),
            dns: dns::Endpoint::new(&config),
            handles: HandleTable::new(config.max_handles()),
            now: Instant::from_millis(0),
            timers,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The interface table, to attach devices.
    pub fn ip_mut(&mut self) -> &mut ip::Endpoint {
        &mut self.ip
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// The connection state behind a stream socket.
    pub fn tcp_state(&self, fd: Fd) -> Option<tcp::State> {
        match self.handles.get(fd)? {
            Handle { kind: SockKind::Tcp, key } => self.tcp.state(key),
            _ => None,
        }
    }

    /// The time of the last `advance`.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// When the earliest timer is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.first_tmo().map(|ms| self.now + Duration::from_millis(ms))
    }

    /// Run one request.
    ///
    /// A request that has to wait answers with a [`Waiter`] registered on the wait object the
    /// condition depends on, before any other event can run. Errors are for the immediate caller
    /// and leave the socket as it was, except for `Close` which releases the socket on failure.
    ///
    /// [`Waiter`]: struct.Waiter.html
    pub fn execute(&mut self, request: Request) -> Result<Reply> {
        let Stack { config, ip, timers, raw, udp, tcp, dns, handles, .. } = self;
        let mut cx = Context { config: &*config, ip, timers };

        match request {
            Request::Create { ty, protocol } => {
                let protocol = ty.protocol(protocol)?;
                if handles.used() >= handles.capacity() {
                    net_debug!("socket: handle table full");
                    return Err(Error::Memory);
                }
                let handle = match ty {
                    SockType::Raw => Handle { kind: SockKind::Raw, key: raw.create(protocol)? },
                    SockType::Dgram => Handle { kind: SockKind::Udp, key: udp.create()? },
                    SockType::Stream => Handle { kind: SockKind::Tcp, key: tcp.create(&mut cx)? },
                };
                let fd = handles.alloc(handle).ok_or(Error::Memory)?;
                net_debug!("socket: {} is {:?}/{}", fd, ty, protocol);
                Ok(Reply::Done(Response::Socket(fd)))
            }
            Request::Resolve { name, slot } => match dns.resolve(&mut cx, udp, &name, slot)? {
                Progress::Done(addr) => Ok(Reply::Done(Response::Resolved(addr))),
                Progress::Wait => dns.wait(slot).map(Reply::Wait).ok_or(Error::Param),
            },
            request => {
                let fd = request.fd().ok_or(Error::Param)?;
                let handle = handles.get(fd).ok_or(Error::Param)?;
                let ops: &mut dyn SockOps = match handle.kind {
                    SockKind::Raw => raw,
                    SockKind::Udp => udp,
                    SockKind::Tcp => tcp,
                };
                execute_on(&mut cx, handles, ops, fd, handle, request)
            }
        }
    }

    /// Take every datagram the devices received and pass it up, until all devices are quiet.
    ///
    /// Returns the number of datagrams handled.
    pub fn poll(&mut self) -> usize {
        let mut count = 0;
        while let Some(buf) = self.ip.receive() {
            self.input(buf);
            count += 1;
        }
        count
    }

    fn input(&mut self, mut buf: PktBuf) {
        let datagram = match self.ip.input(&mut buf) {
            Ok(datagram) => datagram,
            Err(err) => {
                net_trace!("ip in: dropped ({})", err);
                return;
            }
        };
        let Stack { config, ip, timers, raw, udp, tcp, dns, .. } = self;
        let mut cx = Context { config: &*config, ip, timers };

        // Raw sockets get a copy of everything of their protocol, ICMP only goes there.
        let copies = raw.input(&datagram, &buf);
        match datagram.repr.protocol {
            IpProtocol::Udp => match udp.input(&datagram, buf) {
                Ok(key) if Some(key) == dns.socket() => dns.receive(&mut cx, udp),
                Ok(_) => (),
                Err(err) => net_trace!("udp in: dropped ({})", err),
            },
            IpProtocol::Tcp => {
                if let Err(err) = tcp.input(&mut cx, &datagram, buf) {
                    net_trace!("tcp in: dropped ({})", err);
                }
            }
            other => {
                if copies == 0 {
                    net_trace!("ip in: nobody takes {}", other);
                }
            }
        }
    }

    /// Move the clock to `now`, firing every timer that became due.
    ///
    /// Time is handed to the timers deadline by deadline, so a timer re-armed by an earlier
    /// expiry within the same step fires on time as well.
    pub fn advance(&mut self, now: Instant) {
        if now <= self.now {
            return;
        }
        let mut left = now.saturating_since(self.now).as_millis() as u64;
        self.now = now;
        loop {
            match self.timers.first_tmo() {
                Some(due) if due <= left => {
                    left -= due;
                    for event in self.timers.check_tmo(due) {
                        self.on_timer(event);
                    }
                }
                _ => {
                    self.timers.check_tmo(left);
                    break;
                }
            }
        }
    }

    fn on_timer(&mut self, event: TimerEvent) {
        let Stack { config, ip, timers, udp, tcp, dns, .. } = self;
        let mut cx = Context { config: &*config, ip, timers };
        match event {
            TimerEvent::DnsUpdate => dns.on_timer(&mut cx, udp),
            TimerEvent::Retransmit(_) | TimerEvent::Keepalive(_) | TimerEvent::TimeWait(_) => {
                tcp.on_timer(&mut cx, event)
            }
        }
    }
}

/// Run a request naming an existing socket on the layer owning it.
fn execute_on(cx: &mut Context, handles: &mut HandleTable, ops: &mut dyn SockOps, fd: Fd, handle: Handle, request: Request)
    -> Result<Reply>
{
    let key = handle.key;
    match request {
        Request::Bind { addr, .. } => {
            ops.bind(cx, key, addr)?;
            Ok(Reply::Done(Response::None))
        }
        Request::Listen { backlog, .. } => {
            if backlog < 0 {
                return Err(Error::Param);
            }
            ops.listen(cx, key, backlog as usize)?;
            Ok(Reply::Done(Response::None))
        }
        Request::Accept { .. } => {
            if handles.used() >= handles.capacity() {
                return Err(Error::Memory);
            }
            match ops.accept(cx, key)? {
                Progress::Done((child, peer)) => {
                    let fd = handles.alloc(Handle { kind: handle.kind, key: child }).ok_or(Error::Memory)?;
                    net_debug!("socket: accepted {} from {}", fd, peer);
                    Ok(Reply::Done(Response::Accepted(fd, peer)))
                }
                Progress::Wait => park(ops, key, WaitMask::CONN, None),
            }
        }
        Request::Connect { addr, .. } => match ops.connect(cx, key, addr)? {
            Progress::Done(()) => Ok(Reply::Done(Response::None)),
            Progress::Wait => park(ops, key, WaitMask::CONN, None),
        },
        Request::Send { data, to, .. } => {
            let progress = match to {
                Some(to) => ops.send_to(cx, key, &data, to)?,
                None => ops.send(cx, key, &data)?,
            };
            match progress {
                Progress::Done(sent) => Ok(Reply::Done(Response::Sent(sent))),
                Progress::Wait => park(ops, key, WaitMask::WRITE, None),
            }
        }
        Request::Recv { len, .. } => match ops.recv_from(cx, key, len)? {
            Progress::Done((data, from)) => Ok(Reply::Done(Response::Received(data, from))),
            Progress::Wait => park(ops, key, WaitMask::READ, None),
        },
        Request::SetOpt { opt, .. } => {
            ops.setopt(cx, key, opt)?;
            Ok(Reply::Done(Response::None))
        }
        Request::Close { .. } => match ops.close(cx, key) {
            Ok(Progress::Done(())) => {
                handles.free(fd);
                Ok(Reply::Done(Response::None))
            }
            Ok(Progress::Wait) => park(ops, key, WaitMask::CONN, Some(cx.config.close_timeout)),
            Err(err) => {
                ops.destroy(cx, key);
                handles.free(fd);
                Err(err)
            }
        },
        Request::Destroy { .. } => {
            ops.destroy(cx, key);
            handles.free(fd);
            Ok(Reply::Done(Response::None))
        }
        Request::Create { .. } | Request::Resolve { .. } => Err(Error::Param),
    }
}

/// Register the caller on one direction of a socket, with the socket's timeout unless given.
fn park(ops: &mut dyn SockOps, key: Key, mask: WaitMask, timeout: Option<u64>) -> Result<Reply> {
    let sock = ops.sock(key).ok_or(Error::Param)?;
    let waiter = match timeout {
        Some(ms) => sock.wait_for(mask, ms),
        None => sock.wait(mask),
    };
    waiter.map(Reply::Wait).ok_or(Error::NotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{SockAddr, SockOpt};
    use crate::wire::{Ipv4Address, IPV4_HEADER_LEN};

    fn stack() -> Stack {
        let _ = env_logger::builder().is_test(true).try_init();
        Stack::new(Config::default())
    }

    fn addr(port: u16) -> SockAddr {
        SockAddr::new(Ipv4Address::LOOPBACK, port)
    }

    fn done(reply: Result<Reply>) -> Response {
        match reply {
            Ok(Reply::Done(response)) => response,
            other => panic!("expected a response, got {:?}", other),
        }
    }

    fn socket(stack: &mut Stack, ty: SockType) -> Fd {
        match done(stack.execute(Request::Create { ty, protocol: 0 })) {
            Response::Socket(fd) => fd,
            other => panic!("not a socket: {:?}", other),
        }
    }

    #[test]
    fn stream_over_loopback() {
        let mut stack = stack();
        let server = socket(&mut stack, SockType::Stream);
        done(stack.execute(Request::Bind { fd: server, addr: addr(80) }));
        done(stack.execute(Request::Listen { fd: server, backlog: 2 }));
        let pending = match stack.execute(Request::Accept { fd: server }) {
            Ok(Reply::Wait(waiter)) => waiter,
            other => panic!("accept did not wait: {:?}", other),
        };

        let client = socket(&mut stack, SockType::Stream);
        let connecting = match stack.execute(Request::Connect { fd: client, addr: addr(80) }) {
            Ok(Reply::Wait(waiter)) => waiter,
            other => panic!("connect did not wait: {:?}", other),
        };
        assert_eq!(stack.poll(), 3);
        assert_eq!(connecting.wait(), Ok(()));
        assert_eq!(pending.wait(), Ok(()));
        assert_eq!(stack.tcp_state(client), Some(tcp::State::Established));

        let (conn, peer) = match done(stack.execute(Request::Accept { fd: server })) {
            Response::Accepted(fd, peer) => (fd, peer),
            other => panic!("not accepted: {:?}", other),
        };
        assert_eq!(peer, addr(1024));
        // Only once.
        assert!(matches!(stack.execute(Request::Accept { fd: server }), Ok(Reply::Wait(_))));

        let sent = done(stack.execute(Request::Send { fd: client, data: b"ping".to_vec(), to: None }));
        assert_eq!(sent, Response::Sent(4));
        stack.poll();
        let got = done(stack.execute(Request::Recv { fd: conn, len: 16 }));
        assert_eq!(got, Response::Received(b"ping".to_vec(), addr(1024)));

        // Active close from the client, the handle is kept until destroyed.
        let closing = match stack.execute(Request::Close { fd: client }) {
            Ok(Reply::Wait(waiter)) => waiter,
            other => panic!("close did not wait: {:?}", other),
        };
        assert_eq!(closing.timeout(), 5000);
        stack.poll();
        assert_eq!(stack.tcp_state(client), Some(tcp::State::FinWait2));
        assert_eq!(stack.tcp_state(conn), Some(tcp::State::CloseWait));
        assert!(matches!(stack.execute(Request::Recv { fd: conn, len: 16 }), Err(Error::Closed)));

        assert!(matches!(stack.execute(Request::Close { fd: conn }), Ok(Reply::Wait(_))));
        stack.poll();
        assert_eq!(closing.wait(), Err(Error::Closed));
        assert_eq!(stack.tcp_state(client), Some(tcp::State::TimeWait));
        assert_eq!(stack.tcp_state(conn), None);

        done(stack.execute(Request::Destroy { fd: client }));
        done(stack.execute(Request::Destroy { fd: conn }));
        done(stack.execute(Request::Close { fd: server }));
        assert_eq!(stack.handles().used(), 0);
    }

    #[test]
    fn refused_connection() {
        let mut stack = stack();
        let client = socket(&mut stack, SockType::Stream);
        let waiter = match stack.execute(Request::Connect { fd: client, addr: addr(9) }) {
            Ok(Reply::Wait(waiter)) => waiter,
            other => panic!("connect did not wait: {:?}", other),
        };
        stack.poll();
        assert_eq!(waiter.wait(), Err(Error::Reset));
        assert_eq!(stack.tcp_state(client), Some(tcp::State::Closed));
    }

    #[test]
    fn datagrams_over_loopback() {
        let mut stack = stack();
        let server = socket(&mut stack, SockType::Dgram);
        let client = socket(&mut stack, SockType::Dgram);
        done(stack.execute(Request::Bind { fd: server, addr: addr(7) }));
        assert!(matches!(stack.execute(Request::Recv { fd: server, len: 64 }), Ok(Reply::Wait(_))));

        let sent = done(stack.execute(Request::Send { fd: client, data: b"echo".to_vec(), to: Some(addr(7)) }));
        assert_eq!(sent, Response::Sent(4));
        assert_eq!(stack.poll(), 1);
        let got = done(stack.execute(Request::Recv { fd: server, len: 64 }));
        assert_eq!(got, Response::Received(b"echo".to_vec(), addr(1024)));

        // Datagram sockets do not listen.
        assert!(matches!(stack.execute(Request::Listen { fd: server, backlog: 1 }), Err(Error::NotSupported)));
        done(stack.execute(Request::Close { fd: server }));
        assert!(matches!(stack.execute(Request::Recv { fd: server, len: 64 }), Err(Error::Param)));
    }

    #[test]
    fn raw_icmp_sees_whole_datagram() {
        let mut stack = stack();
        let raw = socket(&mut stack, SockType::Raw);
        let payload = [8, 0, 0xf7, 0xff, 0, 0, 0, 0];
        done(stack.execute(Request::Send { fd: raw, data: payload.to_vec(), to: Some(addr(0)) }));
        stack.poll();
        match done(stack.execute(Request::Recv { fd: raw, len: 128 })) {
            Response::Received(data, from) => {
                assert_eq!(data.len(), IPV4_HEADER_LEN + payload.len());
                assert_eq!(&data[IPV4_HEADER_LEN..], &payload[..]);
                assert_eq!(from, addr(0));
            }
            other => panic!("nothing received: {:?}", other),
        }
    }

    #[test]
    fn handles_are_not_reused_before_destroy() {
        let mut stack = stack();
        let server = socket(&mut stack, SockType::Stream);
        done(stack.execute(Request::Bind { fd: server, addr: addr(80) }));
        done(stack.execute(Request::Listen { fd: server, backlog: 1 }));
        let client = socket(&mut stack, SockType::Stream);
        let _ = stack.execute(Request::Connect { fd: client, addr: addr(80) });
        stack.poll();

        assert!(matches!(stack.execute(Request::Close { fd: client }), Ok(Reply::Wait(_))));
        let other = socket(&mut stack, SockType::Dgram);
        assert_ne!(other, client);
        done(stack.execute(Request::Destroy { fd: client }));
        assert_eq!(socket(&mut stack, SockType::Dgram), client);
    }

    #[test]
    fn bad_requests() {
        let mut stack = stack();
        assert!(matches!(stack.execute(Request::Bind { fd: Fd(3), addr: addr(80) }), Err(Error::Param)));
        assert!(matches!(stack.execute(Request::Create { ty: SockType::Dgram, protocol: 6 }), Err(Error::Param)));
        let fd = socket(&mut stack, SockType::Stream);
        assert!(matches!(stack.execute(Request::Listen { fd, backlog: -1 }), Err(Error::Param)));
        assert!(matches!(
            stack.execute(Request::SetOpt { fd, opt: SockOpt::KeepIdle(30) }),
            Ok(Reply::Done(Response::None))));
    }

    #[test]
    fn handle_table_bounds_sockets() {
        let mut config = Config::default();
        config.udp.max_sockets = 1;
        config.tcp.max_sockets = 0;
        config.raw.max_sockets = 0;
        let mut stack = Stack::new(config);
        socket(&mut stack, SockType::Dgram);
        assert!(matches!(stack.execute(Request::Create { ty: SockType::Dgram, protocol: 0 }), Err(Error::Memory)));
    }

    #[test]
    fn local_names_resolve_at_once() {
        let mut stack = stack();
        let reply = stack.execute(Request::Resolve { name: "localhost".into(), slot: 0 });
        assert_eq!(done(reply), Response::Resolved(Ipv4Address::LOOPBACK));
    }

    #[test]
    fn timers_follow_the_clock() {
        let mut stack = stack();
        let client = socket(&mut stack, SockType::Stream);
        // Nobody answers on another network, the SYN is retransmitted until the connection gives up.
        let (nic, handle) = crate::nic::External::new(1500);
        stack.ip_mut().add_interface("ext", crate::wire::Ipv4Cidr::new(Ipv4Address::new(10, 0, 0, 1), 24), None, nic);
        let waiter = match stack.execute(Request::Connect { fd: client, addr: SockAddr::new(Ipv4Address::new(10, 0, 0, 2), 80) }) {
            Ok(Reply::Wait(waiter)) => waiter,
            other => panic!("connect did not wait: {:?}", other),
        };
        assert_eq!(handle.take_sent().len(), 1);
        assert_eq!(stack.next_deadline(), Some(Instant::from_millis(1000)));

        stack.advance(Instant::from_millis(999));
        assert_eq!(handle.sent_count(), 0);
        stack.advance(Instant::from_millis(1000));
        assert_eq!(handle.take_sent().len(), 1);

        // Retransmissions at 3s, 7s, 15s and 23s, the one due at 31s is one too many.
        stack.advance(Instant::from_secs(30));
        assert_eq!(handle.take_sent().len(), 4);
        assert_eq!(stack.tcp_state(client), Some(tcp::State::SynSent));
        stack.advance(Instant::from_secs(31));
        assert_eq!(waiter.wait(), Err(Error::Timeout));
        assert_eq!(stack.tcp_state(client), Some(tcp::State::Closed));
    }
}
