//! Byte storage used by the protocol layers.
//!
//! * [`PktBuf`] holds one packet in a chain of fixed-size blocks, with room to prepend headers.
//! * [`RingBuffer`] is the send and receive window storage of a TCP connection.
//! * [`Pool`] hands out a fixed set of objects, optionally blocking callers while it is empty.
//!
//! [`PktBuf`]: struct.PktBuf.html
//! [`RingBuffer`]: struct.RingBuffer.html
//! [`Pool`]: struct.Pool.html
mod pktbuf;
mod pool;
mod ring;

pub use self::pktbuf::{PktBuf, BLOCK_SIZE};
pub use self::pool::{Locking, Pool};
pub use self::ring::RingBuffer;
