/*! Low-level packet access and construction.

# An overview over packet representations

The `wire` module deals with the packet *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structures e.g. [`ipv4_packet`] or
   [`tcp_packet`]. They are dynamically sized wrappers around `[u8]`, so a reference to one is
   obtained by a cast of a byte slice and never copies.
 * Second, it provides a compact, high-level representation of header data that can be created from
   parsing and emitted into a sequence of octets. This happens through the `Repr` family of structs,
   e.g. [`TcpRepr`] or [`Ipv4Repr`].

[`ipv4_packet`]: struct.ipv4.html
[`tcp_packet`]: struct.tcp.html
[`TcpRepr`]: struct.TcpRepr.html
[`Ipv4Repr`]: struct.Ipv4Repr.html

The `packet` family of data structures guarantees that, if the `packet::check_len()` method
returned `Ok(())`, then no field accessor or setter method will panic. The `new_checked`
constructors are a shorthand for the cast followed by `check_len`. When parsing untrusted input, it
is *necessary* to use them.

In the `Repr` family of data structures, the `Repr::parse()` method never panics and the
`Repr::emit()` method never panics as long as the underlying buffer is at least
`Repr::buffer_len()` (or `header_len()`) octets long.

All multi-octet fields are big-endian on the wire. The conversion happens in the accessors here
and nowhere else.

# Examples

To emit an IP packet header into an octet buffer, and then parse it back:

```rust
use tinynet::wire::*;
let repr = Ipv4Repr {
    src_addr:    Ipv4Address::new(10, 0, 0, 1),
    dst_addr:    Ipv4Address::new(10, 0, 0, 2),
    protocol:    IpProtocol::Tcp,
    payload_len: 10,
    hop_limit:   64
};
let mut buffer = vec![0; repr.buffer_len() + repr.payload_len];
{ // emission
    let packet = ipv4_packet::new_unchecked_mut(&mut buffer);
    repr.emit(packet, 0);
}
{ // parsing
    let packet = ipv4_packet::new_checked(&buffer)
        .expect("truncated packet");
    let parsed = Ipv4Repr::parse(packet)
        .expect("malformed packet");
    assert_eq!(repr, parsed);
}
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `error.rs`
// * `ip.rs`
// * `ipv4.rs`
// * `mod.rs` (this file)
// * `tcp.rs`
// * `udp.rs`

// Field accessors are self-explanatory given the header diagrams in the RFCs.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
}

mod error;
pub mod ip;
pub mod dns;
mod ipv4;
mod tcp;
mod udp;

pub use self::error::{
    Error,
    Result};

pub use self::ip::{
    Protocol as IpProtocol,
    checksum};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Address as Ipv4Address,
    Cidr as Ipv4Cidr,
    Repr as Ipv4Repr,
    HEADER_LEN as IPV4_HEADER_LEN,
    DEFAULT_HOP_LIMIT as IPV4_DEFAULT_HOP_LIMIT};

pub use self::udp::{
    udp as udp_packet,
    finish as udp_finish_checksum,
    Repr as UdpRepr,
    HEADER_LEN as UDP_HEADER_LEN};

pub use self::tcp::{
    tcp as tcp_packet,
    SeqNumber as TcpSeqNumber,
    Repr as TcpRepr,
    Flags as TcpFlags,
    HEADER_LEN as TCP_HEADER_LEN};
