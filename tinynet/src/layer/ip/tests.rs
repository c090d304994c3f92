use super::*;
use crate::nic::External;
use crate::wire::{checksum, IpProtocol};

const OWN: Ipv4Address = Ipv4Address([10, 0, 0, 2]);
const PEER: Ipv4Address = Ipv4Address([10, 0, 0, 7]);
const GATEWAY: Ipv4Address = Ipv4Address([10, 0, 0, 1]);
const REMOTE: Ipv4Address = Ipv4Address([192, 0, 2, 9]);

fn endpoint() -> (Endpoint, crate::nic::ExternalHandle) {
    let mut ip = Endpoint::new();
    let (nic, handle) = External::new(1500);
    ip.add_interface("eth0", Ipv4Cidr::new(OWN, 24), Some(GATEWAY), nic);
    (ip, handle)
}

#[test]
fn route_selection() {
    let (ip, _) = endpoint();
    let local = ip.route(PEER).unwrap();
    assert_eq!(local, Route { iface: 1, src: OWN, mtu: 1500, via_gateway: false });

    let remote = ip.route(REMOTE).unwrap();
    assert_eq!(remote.iface, 1);
    assert!(remote.via_gateway);

    // Our own address loops back.
    let own = ip.route(OWN).unwrap();
    assert_eq!(own.iface, 0);
    assert_eq!(own.src, OWN);

    assert_eq!(ip.route(Ipv4Address::LOOPBACK).map(|route| route.iface), Some(0));
    assert_eq!(ip.route(Ipv4Address::UNSPECIFIED), None);
}

#[test]
fn no_gateway_no_route() {
    let ip = Endpoint::new();
    assert_eq!(ip.route(REMOTE), None);
    let mut ip = ip;
    assert_eq!(
        ip.output(IpProtocol::Udp, Ipv4Address::UNSPECIFIED, REMOTE, PktBuf::from_slice(b"x")),
        Err(Error::Unreachable));
}

#[test]
fn output_builds_header() {
    let (mut ip, handle) = endpoint();
    ip.output(IpProtocol::Udp, Ipv4Address::UNSPECIFIED, PEER, PktBuf::from_slice(b"data")).unwrap();
    let sent = handle.take_sent();
    assert_eq!(sent.len(), 1);
    let packet = ipv4_packet::new_checked(&sent[0]).unwrap();
    let repr = Ipv4Repr::parse(packet).unwrap();
    assert_eq!(repr.src_addr, OWN);
    assert_eq!(repr.dst_addr, PEER);
    assert_eq!(repr.protocol, IpProtocol::Udp);
    assert_eq!(packet.payload_slice(), b"data");
}

#[test]
fn output_refuses_oversized() {
    let mut ip = Endpoint::new();
    let (nic, _handle) = External::new(100);
    ip.add_interface("small", Ipv4Cidr::new(OWN, 24), None, nic);
    let big = PktBuf::alloc(81);
    assert_eq!(ip.output(IpProtocol::Udp, OWN, PEER, big), Err(Error::Size));
    assert!(ip.output(IpProtocol::Udp, OWN, PEER, PktBuf::alloc(80)).is_ok());
}

#[test]
fn loopback_round_trip() {
    let mut ip = Endpoint::new();
    ip.output(IpProtocol::Icmp, Ipv4Address::UNSPECIFIED, Ipv4Address::LOOPBACK, PktBuf::from_slice(b"ping"))
        .unwrap();
    let mut buf = ip.receive().unwrap();
    let datagram = ip.input(&mut buf).unwrap();
    assert_eq!(datagram.header_len, IPV4_HEADER_LEN);
    assert_eq!(datagram.repr.src_addr, Ipv4Address::LOOPBACK);
    assert_eq!(datagram.repr.payload_len, 4);
    assert!(ip.receive().is_none());
}

fn datagram(dst: Ipv4Address, payload: &[u8]) -> Vec<u8> {
    let repr = Ipv4Repr {
        src_addr: PEER,
        dst_addr: dst,
        protocol: IpProtocol::Udp,
        payload_len: payload.len(),
        hop_limit: 64,
    };
    let mut bytes = vec![0; repr.buffer_len() + payload.len()];
    repr.emit(ipv4_packet::new_unchecked_mut(&mut bytes), 1);
    bytes[repr.buffer_len()..].copy_from_slice(payload);
    bytes
}

#[test]
fn input_trims_padding() {
    let (mut ip, handle) = endpoint();
    let mut bytes = datagram(OWN, b"abc");
    bytes.extend_from_slice(&[0; 20]);
    handle.inject(&bytes);
    let mut buf = ip.receive().unwrap();
    let datagram = ip.input(&mut buf).unwrap();
    assert_eq!(buf.total_size(), datagram.header_len + 3);
}

#[test]
fn input_drops_bad_datagrams() {
    let (ip, _) = endpoint();

    let mut bytes = datagram(OWN, b"abc");
    bytes[10] ^= 0xff;
    assert_eq!(ip.input(&mut PktBuf::from_slice(&bytes)), Err(Error::Broken));

    let bytes = datagram(REMOTE, b"abc");
    assert_eq!(ip.input(&mut PktBuf::from_slice(&bytes)), Err(Error::Unreachable));

    let bytes = datagram(OWN, b"abc");
    assert_eq!(ip.input(&mut PktBuf::from_slice(&bytes[..21])), Err(Error::Broken));

    // A fragment.
    let mut bytes = datagram(OWN, b"abc");
    bytes[6] = 0x20;
    bytes[10] = 0;
    bytes[11] = 0;
    let sum = !checksum::data(&bytes[..20]);
    bytes[10..12].copy_from_slice(&sum.to_be_bytes());
    assert_eq!(ip.input(&mut PktBuf::from_slice(&bytes)), Err(Error::Broken));

    let bytes = datagram(Ipv4Address::BROADCAST, b"abc");
    assert!(ip.input(&mut PktBuf::from_slice(&bytes)).is_ok());
}
