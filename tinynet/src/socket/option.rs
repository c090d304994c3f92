use byteorder::{ByteOrder, NativeEndian};

use super::{Error, Result};

pub const SOL_SOCKET: i32 = 0;
pub const SOL_TCP: i32 = 6;

pub const SO_RCVTIMEO: i32 = 1;
pub const SO_SNDTIMEO: i32 = 2;
pub const SO_KEEPALIVE: i32 = 3;
pub const TCP_KEEPIDLE: i32 = 4;
pub const TCP_KEEPINTVL: i32 = 5;
pub const TCP_KEEPCNT: i32 = 6;

/// A decoded socket option.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockOpt {
    /// Receive timeout in milliseconds, zero waits forever.
    RecvTimeout(u64),
    /// Send timeout in milliseconds, zero waits forever.
    SendTimeout(u64),
    KeepAlive(bool),
    /// Idle seconds before the first probe.
    KeepIdle(u32),
    /// Seconds between probes.
    KeepInterval(u32),
    /// Probes before giving up.
    KeepCount(u32),
}

impl SockOpt {
    /// Decode an option from its level, name and value octets.
    ///
    /// Timeouts are a `timeval` of two native 64-bit integers (seconds and microseconds), all
    /// other options a native 32-bit integer.
    pub fn from_raw(level: i32, name: i32, value: &[u8]) -> Result<Self> {
        match (level, name) {
            (SOL_SOCKET, SO_RCVTIMEO) => Ok(SockOpt::RecvTimeout(timeval_millis(value)?)),
            (SOL_SOCKET, SO_SNDTIMEO) => Ok(SockOpt::SendTimeout(timeval_millis(value)?)),
            (SOL_SOCKET, SO_KEEPALIVE) => Ok(SockOpt::KeepAlive(int(value)? != 0)),
            (SOL_TCP, TCP_KEEPIDLE) => Ok(SockOpt::KeepIdle(int(value)? as u32)),
            (SOL_TCP, TCP_KEEPINTVL) => Ok(SockOpt::KeepInterval(int(value)? as u32)),
            (SOL_TCP, TCP_KEEPCNT) => Ok(SockOpt::KeepCount(int(value)? as u32)),
            _ => Err(Error::Param),
        }
    }
}

fn int(value: &[u8]) -> Result<i32> {
    if value.len() != 4 {
        return Err(Error::Param);
    }
    match NativeEndian::read_i32(value) {
        neg if neg < 0 => Err(Error::Param),
        val => Ok(val),
    }
}

fn timeval_millis(value: &[u8]) -> Result<u64> {
    if value.len() != 16 {
        return Err(Error::Param);
    }
    let secs = NativeEndian::read_i64(&value[..8]);
    let micros = NativeEndian::read_i64(&value[8..]);
    if secs < 0 || micros < 0 {
        return Err(Error::Param);
    }
    Ok(secs as u64 * 1000 + micros as u64 / 1000)
}
