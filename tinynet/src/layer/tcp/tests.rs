//! Tcp layer tests.
//!
//! Two flavours: records talking to each other over the loopback device, and a single record
//! talking to a scripted peer whose segments are crafted by hand. The latter makes it possible to
//! lose, duplicate and reorder segments.
use crate::config::Config;
use crate::layer::harness::Harness;
use crate::layer::{tcp, TimerEvent};
use crate::managed::Key;
use crate::socket::{Error, Progress, SockAddr, SockOps, SockOpt, WaitMask};
use crate::wire::{Ipv4Address, TcpFlags, TcpRepr, TcpSeqNumber as SeqNumber};

use super::State;
use super::input::Segment;
use super::output::send_segment;

const SERVER: SockAddr = SockAddr::new(Ipv4Address::LOOPBACK, 80);
const PEER: SockAddr = SockAddr::new(Ipv4Address::LOOPBACK, 4000);

/// Take every segment queued on the loopback device without delivering it.
fn capture(h: &mut Harness) -> Vec<Segment> {
    let mut segments = Vec::new();
    while let Some(mut buf) = h.ip.receive() {
        let datagram = h.ip.input(&mut buf).unwrap();
        segments.push(Segment::parse(&datagram, buf).unwrap());
    }
    segments
}

/// Deliver segments until the loopback device is quiet.
fn deliver(h: &mut Harness, tcp: &mut tcp::Endpoint) -> usize {
    let mut delivered = 0;
    while let Some(mut buf) = h.ip.receive() {
        let datagram = h.ip.input(&mut buf).unwrap();
        let _ = tcp.input(&mut h.cx(), &datagram, buf);
        delivered += 1;
    }
    delivered
}

/// Let `ms` milliseconds pass, dispatching every timer that expires.
fn advance(h: &mut Harness, tcp: &mut tcp::Endpoint, ms: u64) {
    for event in h.timers.check_tmo(ms) {
        tcp.on_timer(&mut h.cx(), event);
    }
}

/// A segment of the scripted peer to the server port.
fn peer(flags: TcpFlags, seq: u32, ack: u32) -> TcpRepr {
    TcpRepr {
        src_port: PEER.port,
        dst_port: SERVER.port,
        flags,
        seq_number: SeqNumber(seq),
        ack_number: SeqNumber(ack),
        window_len: 4096,
        max_seg_size: None,
    }
}

/// Pass a crafted segment through the IP layer into `tcp`.
fn inject(h: &mut Harness, tcp: &mut tcp::Endpoint, repr: TcpRepr, data: &[u8]) -> Result<(), Error> {
    let from = SockAddr::new(Ipv4Address::LOOPBACK, repr.src_port);
    let to = SockAddr::new(Ipv4Address::LOOPBACK, repr.dst_port);
    send_segment(&mut h.cx(), from, to, &repr, data).unwrap();
    let mut buf = h.ip.receive().unwrap();
    let datagram = h.ip.input(&mut buf).unwrap();
    tcp.input(&mut h.cx(), &datagram, buf)
}

fn listener(h: &mut Harness, tcp: &mut tcp::Endpoint, backlog: usize) -> Key {
    let server = tcp.create(&mut h.cx()).unwrap();
    tcp.bind(&mut h.cx(), server, SERVER).unwrap();
    tcp.listen(&mut h.cx(), server, backlog).unwrap();
    server
}

/// A listener with one accepted connection from the scripted peer, whose ISS is 1000.
///
/// Returns the listener, the connection and its next sequence number.
fn established(h: &mut Harness, tcp: &mut tcp::Endpoint) -> (Key, Key, u32) {
    let server = listener(h, tcp, 1);
    inject(h, tcp, peer(TcpFlags::SYN, 1000, 0), &[]).unwrap();
    let syn_ack = capture(h).remove(0);
    let nxt = syn_ack.seq.0.wrapping_add(1);
    inject(h, tcp, peer(TcpFlags::ACK, 1001, nxt), &[]).unwrap();
    let child = match tcp.accept(&mut h.cx(), server).unwrap() {
        Progress::Done((child, _)) => child,
        Progress::Wait => panic!("handshake did not complete"),
    };
    assert!(capture(h).is_empty());
    (server, child, nxt)
}

fn recv(h: &mut Harness, tcp: &mut tcp::Endpoint, key: Key, len: usize) -> Vec<u8> {
    match tcp.recv_from(&mut h.cx(), key, len).unwrap() {
        Progress::Done((data, _)) => data,
        Progress::Wait => Vec::new(),
    }
}

#[test]
fn loopback_connection() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let server = listener(&mut h, &mut tcp, 2);
    let client = tcp.create(&mut h.cx()).unwrap();

    assert_eq!(tcp.connect(&mut h.cx(), client, SERVER), Ok(Progress::Wait));
    assert_eq!(tcp.state(client), Some(State::SynSent));
    let connected = tcp.sock(client).unwrap().wait_for(WaitMask::CONN, 1000).unwrap();
    let incoming = tcp.sock(server).unwrap().wait_for(WaitMask::CONN, 1000).unwrap();
    assert_eq!(tcp.accept(&mut h.cx(), server), Ok(Progress::Wait));

    // SYN, SYN|ACK, ACK
    assert_eq!(deliver(&mut h, &mut tcp), 3);
    assert_eq!(connected.wait(), Ok(()));
    assert_eq!(incoming.wait(), Ok(()));
    assert_eq!(tcp.state(client), Some(State::Established));

    let (child, from) = match tcp.accept(&mut h.cx(), server).unwrap() {
        Progress::Done(accepted) => accepted,
        Progress::Wait => panic!("no connection to accept"),
    };
    assert_eq!(from, SockAddr::new(Ipv4Address::LOOPBACK, 1024));
    assert_eq!(tcp.accept(&mut h.cx(), server), Ok(Progress::Wait));
    assert_eq!(tcp.state(child), Some(State::Established));
    // Loopback MTU minus the headers.
    assert_eq!(tcp.sockets.get(child).unwrap().mss, 1460);

    assert_eq!(tcp.send(&mut h.cx(), client, b"hello"), Ok(Progress::Done(5)));
    // Data and its ACK.
    assert_eq!(deliver(&mut h, &mut tcp), 2);
    assert_eq!(recv(&mut h, &mut tcp, child, 64), b"hello".to_vec());
    assert!(recv(&mut h, &mut tcp, child, 64).is_empty());
    assert!(!h.timers.contains(&TimerEvent::Retransmit(client)));
}

#[test]
fn loopback_close() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let server = listener(&mut h, &mut tcp, 1);
    let client = tcp.create(&mut h.cx()).unwrap();
    tcp.connect(&mut h.cx(), client, SERVER).unwrap();
    deliver(&mut h, &mut tcp);
    let child = match tcp.accept(&mut h.cx(), server).unwrap() {
        Progress::Done((child, _)) => child,
        Progress::Wait => panic!("no connection to accept"),
    };

    assert_eq!(tcp.close(&mut h.cx(), client), Ok(Progress::Wait));
    assert_eq!(tcp.state(client), Some(State::FinWait1));
    deliver(&mut h, &mut tcp);
    assert_eq!(tcp.state(client), Some(State::FinWait2));
    assert_eq!(tcp.state(child), Some(State::CloseWait));

    // End of stream, but sending still works.
    assert_eq!(tcp.recv_from(&mut h.cx(), child, 10), Err(Error::Closed));
    assert_eq!(tcp.send(&mut h.cx(), child, b"bye"), Ok(Progress::Done(3)));
    deliver(&mut h, &mut tcp);
    assert_eq!(recv(&mut h, &mut tcp, client, 10), b"bye".to_vec());

    let closed = tcp.sock(client).unwrap().wait_for(WaitMask::CONN, 1000).unwrap();
    assert_eq!(tcp.close(&mut h.cx(), child), Ok(Progress::Wait));
    assert_eq!(tcp.state(child), Some(State::LastAck));
    deliver(&mut h, &mut tcp);
    assert_eq!(tcp.state(child), None);
    assert_eq!(tcp.state(client), Some(State::TimeWait));
    assert_eq!(closed.wait(), Err(Error::Closed));

    // Released by the application but kept for twice the segment lifetime.
    tcp.destroy(&mut h.cx(), client);
    assert_eq!(tcp.state(client), Some(State::TimeWait));
    let msl = h.config.tcp.msl;
    advance(&mut h, &mut tcp, 2 * msl - 1);
    assert_eq!(tcp.state(client), Some(State::TimeWait));
    advance(&mut h, &mut tcp, 1);
    assert_eq!(tcp.state(client), None);
    assert!(h.timers.is_empty());
}

#[test]
fn passive_open_sets_up_child() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let server = listener(&mut h, &mut tcp, 1);

    let mut syn = peer(TcpFlags::SYN, 1000, 0);
    syn.max_seg_size = Some(200);
    inject(&mut h, &mut tcp, syn, &[]).unwrap();
    let reply = capture(&mut h);
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].repr.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq!(reply[0].repr.ack_number, SeqNumber(1001));
    assert_eq!(reply[0].remote, SERVER);

    let child = tcp.sockets.iter()
        .find(|(_, record)| record.parent == Some(server))
        .map(|(key, _)| key)
        .unwrap();
    {
        let record = tcp.sockets.get(child).unwrap();
        assert_eq!(record.state, State::SynReceived);
        assert_eq!(record.base.local, SERVER);
        assert_eq!(record.base.remote, PEER);
        assert_eq!(record.rcv.nxt, SeqNumber(1001));
        assert_eq!(record.mss, 200);
        assert!(record.flags.inactive);
    }
    assert_eq!(tcp.accept(&mut h.cx(), server), Ok(Progress::Wait));

    // The backlog holds a single half-open connection.
    let mut other = peer(TcpFlags::SYN, 5000, 0);
    other.src_port = 4001;
    assert_eq!(inject(&mut h, &mut tcp, other, &[]), Err(Error::Full));
    assert!(capture(&mut h).is_empty());

    let nxt = reply[0].seq.0.wrapping_add(1);
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1001, nxt), &[]).unwrap();
    assert_eq!(tcp.accept(&mut h.cx(), server), Ok(Progress::Done((child, PEER))));
    assert_eq!(tcp.accept(&mut h.cx(), server), Ok(Progress::Wait));
    assert!(!tcp.sockets.get(child).unwrap().flags.inactive);
}

#[test]
fn accept_after_peer_finished() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let server = listener(&mut h, &mut tcp, 1);
    inject(&mut h, &mut tcp, peer(TcpFlags::SYN, 1000, 0), &[]).unwrap();
    let nxt = capture(&mut h)[0].seq.0.wrapping_add(1);
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1001, nxt), &[]).unwrap();

    // Request and end of stream, all before the application looks.
    let flags = TcpFlags::ACK | TcpFlags::PSH | TcpFlags::FIN;
    inject(&mut h, &mut tcp, peer(flags, 1001, nxt), b"GET").unwrap();
    let ack = capture(&mut h);
    assert_eq!(ack.len(), 1);
    assert_eq!(ack[0].repr.ack_number, SeqNumber(1005));

    let child = match tcp.accept(&mut h.cx(), server).unwrap() {
        Progress::Done((child, from)) => {
            assert_eq!(from, PEER);
            child
        }
        Progress::Wait => panic!("finished connection was not handed out"),
    };
    assert_eq!(tcp.state(child), Some(State::CloseWait));
    assert_eq!(tcp.accept(&mut h.cx(), server), Ok(Progress::Wait));
    assert_eq!(recv(&mut h, &mut tcp, child, 64), b"GET".to_vec());
    assert_eq!(tcp.recv_from(&mut h.cx(), child, 64), Err(Error::Closed));

    // The backlog slot is free again.
    let mut other = peer(TcpFlags::SYN, 5000, 0);
    other.src_port = 4001;
    inject(&mut h, &mut tcp, other, &[]).unwrap();
    assert_eq!(capture(&mut h)[0].repr.flags, TcpFlags::SYN | TcpFlags::ACK);
}

#[test]
fn handshake_ack_carrying_fin() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let server = listener(&mut h, &mut tcp, 1);
    let incoming = tcp.sock(server).unwrap().wait_for(WaitMask::CONN, 0).unwrap();
    inject(&mut h, &mut tcp, peer(TcpFlags::SYN, 1000, 0), &[]).unwrap();
    let nxt = capture(&mut h)[0].seq.0.wrapping_add(1);

    inject(&mut h, &mut tcp, peer(TcpFlags::ACK | TcpFlags::FIN, 1001, nxt), b"hi").unwrap();
    assert_eq!(incoming.wait(), Ok(()));
    assert_eq!(capture(&mut h).last().unwrap().repr.ack_number, SeqNumber(1004));
    let child = match tcp.accept(&mut h.cx(), server).unwrap() {
        Progress::Done((child, _)) => child,
        Progress::Wait => panic!("finished connection was not handed out"),
    };
    assert_eq!(tcp.state(child), Some(State::CloseWait));
    assert_eq!(recv(&mut h, &mut tcp, child, 64), b"hi".to_vec());
}

#[test]
fn closing_listener_drops_pending() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let server = listener(&mut h, &mut tcp, 4);
    inject(&mut h, &mut tcp, peer(TcpFlags::SYN, 1000, 0), &[]).unwrap();
    assert_eq!(tcp.len(), 2);

    assert_eq!(tcp.close(&mut h.cx(), server), Ok(Progress::Done(())));
    assert!(tcp.is_empty());
    assert!(h.timers.is_empty());
}

#[test]
fn acknowledgements() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let (_, child, nxt) = established(&mut h, &mut tcp);

    assert_eq!(tcp.send(&mut h.cx(), child, b"abcdef"), Ok(Progress::Done(6)));
    let sent = capture(&mut h);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].seq, SeqNumber(nxt));
    assert_eq!(sent[0].data, b"abcdef".to_vec());
    assert!(h.timers.contains(&TimerEvent::Retransmit(child)));

    // Partial, then the same again.
    for _ in 0..2 {
        inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1001, nxt + 3), &[]).unwrap();
        let record = tcp.sockets.get(child).unwrap();
        assert_eq!(record.snd.una, SeqNumber(nxt + 3));
        assert_eq!(record.snd.buf.len(), 3);
        assert!(capture(&mut h).is_empty());
    }

    // Acknowledging what was never sent is answered but changes nothing.
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1001, nxt + 100), &[]).unwrap();
    let answer = capture(&mut h);
    assert_eq!(answer.len(), 1);
    assert_eq!(answer[0].repr.flags, TcpFlags::ACK);
    assert_eq!(answer[0].seq, SeqNumber(nxt + 6));
    assert_eq!(tcp.state(child), Some(State::Established));
    assert_eq!(tcp.sockets.get(child).unwrap().snd.una, SeqNumber(nxt + 3));

    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1001, nxt + 6), &[]).unwrap();
    assert!(tcp.sockets.get(child).unwrap().snd.buf.is_empty());
    assert!(!h.timers.contains(&TimerEvent::Retransmit(child)));
}

#[test]
fn receive_window() {
    let mut config = Config::default();
    config.tcp.recv_buffer = 8;
    let mut h = Harness::with_config(config);
    let mut tcp = tcp::Endpoint::new(&h.config);
    let (_, child, nxt) = established(&mut h, &mut tcp);

    // Just past the window.
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1009, nxt), b"z").unwrap();
    let answer = capture(&mut h);
    assert_eq!(answer.len(), 1);
    assert_eq!(answer[0].repr.ack_number, SeqNumber(1001));
    assert!(tcp.sockets.get(child).unwrap().rcv.buf.is_empty());

    // Overlapping the left edge, only the new part is taken.
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 999, nxt), b"xyhello").unwrap();
    assert_eq!(capture(&mut h)[0].repr.ack_number, SeqNumber(1006));
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1006, nxt), b"abc").unwrap();
    let answer = capture(&mut h);
    assert_eq!(answer[0].repr.ack_number, SeqNumber(1009));
    assert_eq!(answer[0].repr.window_len, 0);

    // A closed window only takes empty segments at its edge.
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1009, nxt), b"z").unwrap();
    assert_eq!(capture(&mut h).len(), 1);
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1009, nxt), &[]).unwrap();
    assert!(capture(&mut h).is_empty());

    assert_eq!(recv(&mut h, &mut tcp, child, 64), b"helloabc".to_vec());
}

#[test]
fn retransmission_backoff() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let client = tcp.create(&mut h.cx()).unwrap();
    tcp.connect(&mut h.cx(), client, SERVER).unwrap();

    let connecting = tcp.sock(client).unwrap().wait_for(WaitMask::CONN, 0).unwrap();
    let rexmit = TimerEvent::Retransmit(client);
    let mut now = 0;
    let mut sent_at: Vec<u64> = capture(&mut h).iter().map(|_| now).collect();
    while let Some(wait) = h.timers.remaining(&rexmit) {
        now += wait;
        advance(&mut h, &mut tcp, wait);
        for segment in capture(&mut h) {
            assert!(segment.repr.flags.syn());
            sent_at.push(now);
        }
    }

    assert_eq!(sent_at, vec![0, 1000, 3000, 7000, 15000, 23000]);
    assert_eq!(now, 31000);
    assert_eq!(tcp.state(client), Some(State::Closed));
    assert_eq!(connecting.wait(), Err(Error::Timeout));
    // The application still holds the record.
    assert_eq!(tcp.close(&mut h.cx(), client), Ok(Progress::Done(())));
    assert!(tcp.is_empty());
}

#[test]
fn reset_for_unknown_port() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);

    inject(&mut h, &mut tcp, peer(TcpFlags::SYN, 500, 0), &[]).unwrap_err();
    let reset = capture(&mut h);
    assert_eq!(reset.len(), 1);
    assert_eq!(reset[0].repr.flags, TcpFlags::RST | TcpFlags::ACK);
    assert_eq!(reset[0].repr.ack_number, SeqNumber(501));
    assert_eq!(reset[0].local, PEER);

    let stray = peer(TcpFlags::ACK, 600, 777);
    assert_eq!(inject(&mut h, &mut tcp, stray, b"data"), Err(Error::Unreachable));
    let reset = capture(&mut h);
    assert_eq!(reset[0].repr.flags, TcpFlags::RST);
    assert_eq!(reset[0].seq, SeqNumber(777));

    // Never answer a reset.
    assert_eq!(inject(&mut h, &mut tcp, peer(TcpFlags::RST, 600, 0), &[]), Err(Error::Unreachable));
    assert!(capture(&mut h).is_empty());
}

#[test]
fn reset_aborts_connection() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let (_, child, _) = established(&mut h, &mut tcp);
    let reader = tcp.sock(child).unwrap().wait_for(WaitMask::READ, 1000).unwrap();

    inject(&mut h, &mut tcp, peer(TcpFlags::RST, 1001, 0), &[]).unwrap();
    assert_eq!(reader.wait(), Err(Error::Reset));
    assert_eq!(tcp.state(child), Some(State::Closed));
    assert_eq!(tcp.send(&mut h.cx(), child, b"x"), Err(Error::Closed));
}

#[test]
fn keepalive_probes() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let (_, child, nxt) = established(&mut h, &mut tcp);
    let keepalive = TimerEvent::Keepalive(child);

    tcp.setopt(&mut h.cx(), child, SockOpt::KeepIdle(1)).unwrap();
    tcp.setopt(&mut h.cx(), child, SockOpt::KeepInterval(1)).unwrap();
    tcp.setopt(&mut h.cx(), child, SockOpt::KeepCount(2)).unwrap();
    assert!(!h.timers.contains(&keepalive));
    tcp.setopt(&mut h.cx(), child, SockOpt::KeepAlive(true)).unwrap();
    assert_eq!(h.timers.remaining(&keepalive), Some(1000));

    advance(&mut h, &mut tcp, 1000);
    let probe = capture(&mut h);
    assert_eq!(probe.len(), 1);
    assert_eq!(probe[0].repr.flags, TcpFlags::ACK);
    assert_eq!(probe[0].seq, SeqNumber(nxt - 1));

    // An answer restarts the idle period and the probe count.
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1001, nxt), &[]).unwrap();
    assert_eq!(h.timers.remaining(&keepalive), Some(1000));
    for _ in 0..2 {
        advance(&mut h, &mut tcp, 1000);
        assert_eq!(capture(&mut h).len(), 1);
        assert_eq!(tcp.state(child), Some(State::Established));
    }

    let reader = tcp.sock(child).unwrap().wait_for(WaitMask::READ, 0).unwrap();
    advance(&mut h, &mut tcp, 1000);
    assert_eq!(reader.wait(), Err(Error::Closed));
    let reset = capture(&mut h);
    assert_eq!(reset.len(), 1);
    assert!(reset[0].repr.flags.rst());
    assert_eq!(tcp.state(child), Some(State::Closed));
    assert!(!h.timers.contains(&keepalive));
}

#[test]
fn time_wait_slot_is_reclaimed() {
    let mut config = Config::default();
    config.tcp.max_sockets = 2;
    let mut h = Harness::with_config(config);
    let mut tcp = tcp::Endpoint::new(&h.config);
    let (_, child, nxt) = established(&mut h, &mut tcp);

    assert_eq!(tcp.close(&mut h.cx(), child), Ok(Progress::Wait));
    let fin = capture(&mut h);
    assert_eq!(fin[0].repr.flags, TcpFlags::FIN | TcpFlags::ACK);
    inject(&mut h, &mut tcp, peer(TcpFlags::ACK, 1001, nxt + 1), &[]).unwrap();
    assert_eq!(tcp.state(child), Some(State::FinWait2));
    inject(&mut h, &mut tcp, peer(TcpFlags::FIN | TcpFlags::ACK, 1001, nxt + 1), &[]).unwrap();
    assert_eq!(capture(&mut h)[0].repr.ack_number, SeqNumber(1002));
    assert_eq!(tcp.state(child), Some(State::TimeWait));
    assert_eq!(h.timers.remaining(&TimerEvent::TimeWait(child)), Some(2 * h.config.tcp.msl));
    assert_eq!(tcp.recv_from(&mut h.cx(), child, 10), Err(Error::Closed));

    // Our last ACK got lost, the peer repeats its FIN.
    inject(&mut h, &mut tcp, peer(TcpFlags::FIN | TcpFlags::ACK, 1001, nxt + 1), &[]).unwrap();
    assert_eq!(capture(&mut h)[0].repr.ack_number, SeqNumber(1002));

    let fresh = tcp.create(&mut h.cx()).unwrap();
    assert_eq!(tcp.state(child), None);
    assert_eq!(tcp.state(fresh), Some(State::Closed));
    assert_eq!(tcp.create(&mut h.cx()), Err(Error::Memory));
}

#[test]
fn bind_and_state_errors() {
    let mut h = Harness::new();
    let mut tcp = tcp::Endpoint::new(&h.config);
    let server = listener(&mut h, &mut tcp, 1);
    let other = tcp.create(&mut h.cx()).unwrap();

    assert_eq!(tcp.bind(&mut h.cx(), other, SERVER), Err(Error::Address));
    let foreign = SockAddr::new(Ipv4Address::new(192, 0, 2, 1), 80);
    assert_eq!(tcp.bind(&mut h.cx(), other, foreign), Err(Error::Address));
    assert_eq!(tcp.bind(&mut h.cx(), other, SockAddr::ANY), Err(Error::Param));

    assert_eq!(tcp.connect(&mut h.cx(), server, PEER), Err(Error::State));
    assert_eq!(tcp.send(&mut h.cx(), server, b"x"), Err(Error::State));
    assert_eq!(tcp.accept(&mut h.cx(), other), Err(Error::State));
    assert_eq!(tcp.connect(&mut h.cx(), other, SockAddr::ANY), Err(Error::Param));
    assert_eq!(tcp.send(&mut h.cx(), other, b"x"), Err(Error::Closed));
}
