use crate::config::Config;
use crate::layer::udp;
use crate::layer::harness::Harness;
use crate::managed::Key;
use crate::socket::{Error, Progress, SockAddr, SockOps};
use crate::wire::{Ipv4Address, IPV4_HEADER_LEN, UDP_HEADER_LEN};

const LOCAL: Ipv4Address = Ipv4Address::LOOPBACK;

fn addr(port: u16) -> SockAddr {
    SockAddr::new(LOCAL, port)
}

/// Move everything on the loopback device into the UDP sockets.
fn deliver(harness: &mut Harness, udp: &mut udp::Endpoint) -> Vec<Result<Key, Error>> {
    let mut delivered = Vec::new();
    while let Some(mut buf) = harness.ip.receive() {
        let datagram = harness.ip.input(&mut buf).unwrap();
        delivered.push(udp.input(&datagram, buf));
    }
    delivered
}

fn recv(harness: &mut Harness, udp: &mut udp::Endpoint, key: Key, len: usize) -> Option<(Vec<u8>, SockAddr)> {
    match udp.recv_from(&mut harness.cx(), key, len).unwrap() {
        Progress::Done(got) => Some(got),
        Progress::Wait => None,
    }
}

#[test]
fn datagram_round_trip() {
    let mut harness = Harness::new();
    let mut udp = udp::Endpoint::new(&harness.config);
    let server = udp.create().unwrap();
    let client = udp.create().unwrap();
    udp.bind(&mut harness.cx(), server, addr(7)).unwrap();

    assert!(recv(&mut harness, &mut udp, server, 64).is_none());
    let sent = udp.send_to(&mut harness.cx(), client, b"hello", addr(7)).unwrap();
    assert_eq!(sent, Progress::Done(5));
    assert_eq!(deliver(&mut harness, &mut udp), vec![Ok(server)]);

    // The client got the first dynamic port.
    let (data, from) = recv(&mut harness, &mut udp, server, 64).unwrap();
    assert_eq!(data, b"hello".to_vec());
    assert_eq!(from, addr(1024));

    udp.send_to(&mut harness.cx(), server, b"world!", from).unwrap();
    assert_eq!(deliver(&mut harness, &mut udp), vec![Ok(client)]);
    // Reading less than the datagram drops the rest.
    let (data, from) = recv(&mut harness, &mut udp, client, 3).unwrap();
    assert_eq!(data, b"wor".to_vec());
    assert_eq!(from, addr(7));
    assert!(recv(&mut harness, &mut udp, client, 64).is_none());
}

#[test]
fn checksum_is_filled_and_checked() {
    let mut harness = Harness::new();
    let mut udp = udp::Endpoint::new(&harness.config);
    let sock = udp.create().unwrap();
    udp.bind(&mut harness.cx(), sock, addr(9)).unwrap();
    udp.send_to(&mut harness.cx(), sock, b"abc", addr(9)).unwrap();

    let mut buf = harness.ip.receive().unwrap();
    let mut bytes = buf.to_vec();
    let checksum = &bytes[IPV4_HEADER_LEN + 6..IPV4_HEADER_LEN + 8];
    assert_ne!(checksum, &[0, 0][..]);

    // Corrupt one payload octet.
    bytes[IPV4_HEADER_LEN + UDP_HEADER_LEN] ^= 0x01;
    let mut corrupt = crate::storage::PktBuf::from_slice(&bytes);
    let datagram = harness.ip.input(&mut corrupt).unwrap();
    assert_eq!(udp.input(&datagram, corrupt), Err(Error::Broken));

    let datagram = harness.ip.input(&mut buf).unwrap();
    assert_eq!(udp.input(&datagram, buf), Ok(sock));
    assert_eq!(udp.queued(sock), 1);
}

#[test]
fn matching_rules() {
    let mut harness = Harness::new();
    let mut udp = udp::Endpoint::new(&harness.config);
    let connected = udp.create().unwrap();
    let sender = udp.create().unwrap();
    udp.bind(&mut harness.cx(), connected, addr(53)).unwrap();
    udp.bind(&mut harness.cx(), sender, addr(2000)).unwrap();
    udp.connect(&mut harness.cx(), connected, addr(3000)).unwrap();

    // Wrong source port for the connected socket, and nobody on port 54.
    udp.send_to(&mut harness.cx(), sender, b"x", addr(53)).unwrap();
    udp.send_to(&mut harness.cx(), sender, b"x", addr(54)).unwrap();
    assert_eq!(deliver(&mut harness, &mut udp), vec![Err(Error::Unreachable), Err(Error::Unreachable)]);

    // A connected socket refuses other destinations.
    assert_eq!(udp.send_to(&mut harness.cx(), connected, b"x", addr(3001)), Err(Error::Param));
    assert_eq!(udp.send(&mut harness.cx(), connected, b"x"), Ok(Progress::Done(1)));
}

#[test]
fn bind_conflicts() {
    let mut harness = Harness::new();
    let mut udp = udp::Endpoint::new(&harness.config);
    let first = udp.create().unwrap();
    let second = udp.create().unwrap();
    udp.bind(&mut harness.cx(), first, SockAddr::new(Ipv4Address::UNSPECIFIED, 5000)).unwrap();

    assert_eq!(udp.bind(&mut harness.cx(), first, addr(5001)), Err(Error::Bind));
    assert_eq!(udp.bind(&mut harness.cx(), second, addr(5000)), Err(Error::Bind));
    let foreign = SockAddr::new(Ipv4Address::new(192, 0, 2, 1), 5002);
    assert_eq!(udp.bind(&mut harness.cx(), second, foreign), Err(Error::Param));
    udp.bind(&mut harness.cx(), second, addr(5002)).unwrap();
}

#[test]
fn queue_limit_drops() {
    let mut config = Config::default();
    config.udp.recv_queue = 2;
    let mut harness = Harness::with_config(config);
    let mut udp = udp::Endpoint::new(&harness.config);
    let sock = udp.create().unwrap();
    udp.bind(&mut harness.cx(), sock, addr(7)).unwrap();
    for _ in 0..3 {
        udp.send_to(&mut harness.cx(), sock, b"z", addr(7)).unwrap();
    }
    assert_eq!(deliver(&mut harness, &mut udp), vec![Ok(sock); 3]);
    assert_eq!(udp.queued(sock), 2);
}

#[test]
fn no_ports_left() {
    let mut config = Config::default();
    config.dynamic_ports = 4000..4001;
    let mut harness = Harness::with_config(config);
    let mut udp = udp::Endpoint::new(&harness.config);
    let holder = udp.create().unwrap();
    let late = udp.create().unwrap();
    udp.bind(&mut harness.cx(), holder, addr(4000)).unwrap();
    assert_eq!(udp.send_to(&mut harness.cx(), late, b"x", addr(7)), Err(Error::None));

    assert_eq!(udp.close(&mut harness.cx(), holder), Ok(Progress::Done(())));
    assert_eq!(udp.send_to(&mut harness.cx(), late, b"x", addr(7)), Ok(Progress::Done(1)));
    assert_eq!(udp.len(), 1);
}
