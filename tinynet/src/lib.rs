//! A small TCP/IP stack for single-address hosts, behind a blocking socket interface.
//!
//! ## Table of contents
//!
//! This is also a recommended reading order but feel free to skip ahead, each chapter tries to be
//! somewhat self-contained.
//!
//! 1. [Design](#design-and-relevant-core-concepts)
//! 2. [The wire module](wire/index.html)
//! 3. [The layers](layer/index.html)
//!    1. [Ip V4](layer/ip/index.html)
//!    1. [Raw](layer/raw/index.html)
//!    1. [Udp](layer/udp/index.html)
//!    1. [Tcp](layer/tcp/index.html)
//!    1. [Dns](layer/dns/index.html)
//! 4. [Network interfaces](nic/index.html)
//! 5. [Sockets and the engine](socket/index.html)
//! 6. Internals
//!    1. [The managed module](managed/index.html)
//!    2. [The storage module](storage/index.html)
//!    3. [Synchronization](sync/index.html)
//!
//! ## Design and relevant core concepts
//!
//! All protocol state lives in one [`Stack`] which is owned by exactly one thread, the engine.
//! Applications never touch it. They call the blocking functions of [`Sockets`], each of which is
//! turned into a request, carried to the engine through a bounded mailbox and answered there.
//! When an operation has to wait, for a connection, for data or for room in a buffer, the engine
//! answers with a waiter and the calling thread parks on it outside the engine. Nothing inside
//! the engine ever blocks.
//!
//! Records are referenced by generation-checked keys into slot maps, never by pointer. A key
//! that outlives its record (a timer, a handle, a child's link to its listener) simply fails to
//! resolve.
//!
//! Network devices carry whole IPv4 datagrams. The loopback device is always present, more can be
//! attached before the engine starts, see [`External`] for one fed from outside.
//!
//! ```no_run
//! use tinynet::config::Config;
//! use tinynet::socket::{Engine, SockAddr, Stack, AF_INET, SOCK_DGRAM};
//! use tinynet::wire::Ipv4Address;
//!
//! let (_engine, sockets) = Engine::spawn(Stack::new(Config::default())).unwrap();
//! let fd = sockets.socket(AF_INET, SOCK_DGRAM, 0).unwrap();
//! sockets.sendto(fd, b"hello", SockAddr::new(Ipv4Address::LOOPBACK, 9)).unwrap();
//! sockets.close(fd).unwrap();
//! ```
//!
//! [`Stack`]: socket/struct.Stack.html
//! [`Sockets`]: socket/struct.Sockets.html
//! [`External`]: nic/struct.External.html
#[macro_use] mod macros;

pub mod config;
pub mod layer;
pub mod managed;
pub mod nic;
pub mod socket;
pub mod storage;
pub mod sync;
pub mod time;
pub mod timer;
pub mod wire;
