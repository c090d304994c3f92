use crate::layer::{ip, Context};
use crate::managed::Key;
use crate::wire::IpProtocol;

use super::{Error, Progress, Result, SockAddr, SockOpt};
use super::wait::{Wait, WaitMask, Waiter};

/// The part every socket record starts with.
///
/// Addresses, timeouts and the wait objects. Which of the three wait objects exist depends on
/// the protocol: datagram sockets only ever wait for reading, streams wait in every direction.
#[derive(Debug)]
pub struct Sock {
    pub local: SockAddr,
    pub remote: SockAddr,
    pub protocol: IpProtocol,
    /// Receive timeout in milliseconds, zero waits forever.
    pub rcv_tmo: u64,
    /// Send timeout in milliseconds, zero waits forever.
    pub snd_tmo: u64,
    rcv_wait: Option<Wait>,
    snd_wait: Option<Wait>,
    conn_wait: Option<Wait>,
}

/// Selects the implementation of a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SockKind {
    Raw,
    Udp,
    Tcp,
}

/// The operations a socket implementation provides.
///
/// Implemented by the endpoint of each protocol layer, which owns all of its records. Every
/// method names its record by key; a key that no longer resolves is a parameter error. Methods
/// that may have to wait return [`Progress::Wait`] and the caller attaches to the matching wait
/// object of [`Sock`].
///
/// Operations a protocol does not have keep the default, which fails with `NotSupported`.
///
/// [`Progress::Wait`]: enum.Progress.html#variant.Wait
/// [`Sock`]: struct.Sock.html
pub trait SockOps {
    /// The common part of a record.
    fn sock(&mut self, key: Key) -> Option<&mut Sock>;

    /// Start closing, `Done` when the record was released right away.
    fn close(&mut self, cx: &mut Context, key: Key) -> Result<Progress<()>>;

    /// Release whatever is left of the record after a close.
    fn destroy(&mut self, cx: &mut Context, key: Key);

    fn bind(&mut self, cx: &mut Context, key: Key, addr: SockAddr) -> Result<()>;

    fn connect(&mut self, cx: &mut Context, key: Key, addr: SockAddr) -> Result<Progress<()>>;

    fn listen(&mut self, _: &mut Context, _: Key, _backlog: usize) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Take one established connection, returns the new record and its peer.
    fn accept(&mut self, _: &mut Context, _: Key) -> Result<Progress<(Key, SockAddr)>> {
        Err(Error::NotSupported)
    }

    /// Send to the connected peer.
    fn send(&mut self, cx: &mut Context, key: Key, data: &[u8]) -> Result<Progress<usize>> {
        let remote = self.sock(key).ok_or(Error::Param)?.remote;
        self.send_to(cx, key, data, remote)
    }

    fn send_to(&mut self, _: &mut Context, _: Key, _data: &[u8], _to: SockAddr)
        -> Result<Progress<usize>>
    {
        Err(Error::NotSupported)
    }

    /// Receive up to `len` octets, with the address they came from.
    fn recv_from(&mut self, cx: &mut Context, key: Key, len: usize)
        -> Result<Progress<(Vec<u8>, SockAddr)>>;

    fn setopt(&mut self, _: &mut Context, key: Key, opt: SockOpt) -> Result<()> {
        self.sock(key).ok_or(Error::Param)?.setopt(opt)
    }
}

impl Sock {
    /// A record with no addresses, infinite timeouts and a wait object for each direction in
    /// `waits`.
    pub fn new(protocol: IpProtocol, waits: WaitMask) -> Self {
        let wait = |mask| if waits.contains(mask) { Some(Wait::new()) } else { None };
        Sock {
            local: SockAddr::ANY,
            remote: SockAddr::ANY,
            protocol,
            rcv_tmo: 0,
            snd_tmo: 0,
            rcv_wait: wait(WaitMask::READ),
            snd_wait: wait(WaitMask::WRITE),
            conn_wait: wait(WaitMask::CONN),
        }
    }

    /// Post `result` to every waiter of the directions in `mask`.
    pub fn wakeup(&mut self, mask: WaitMask, result: Result<()>) {
        if mask.contains(WaitMask::CONN) {
            if let Some(wait) = &mut self.conn_wait {
                wait.wakeup(result);
            }
        }
        if mask.contains(WaitMask::WRITE) {
            if let Some(wait) = &mut self.snd_wait {
                wait.wakeup(result);
            }
        }
        if mask.contains(WaitMask::READ) {
            if let Some(wait) = &mut self.rcv_wait {
                wait.wakeup(result);
            }
        }
    }

    /// Register a caller on one direction.
    ///
    /// Reading and connecting use the receive timeout, writing the send timeout. `None` if the
    /// socket never waits in that direction.
    pub fn wait(&mut self, mask: WaitMask) -> Option<Waiter> {
        let timeout = if mask == WaitMask::WRITE { self.snd_tmo } else { self.rcv_tmo };
        self.wait_for(mask, timeout)
    }

    /// Like [`wait`] but with an explicit timeout.
    ///
    /// [`wait`]: #method.wait
    pub fn wait_for(&mut self, mask: WaitMask, timeout: u64) -> Option<Waiter> {
        let wait = if mask == WaitMask::READ {
            self.rcv_wait.as_mut()?
        } else if mask == WaitMask::WRITE {
            self.snd_wait.as_mut()?
        } else if mask == WaitMask::CONN {
            self.conn_wait.as_mut()?
        } else {
            return None;
        };
        Some(wait.add(timeout))
    }

    /// Set the local address.
    ///
    /// A specified address must belong to one of our interfaces.
    pub fn bind(&mut self, ip: &ip::Endpoint, addr: SockAddr) -> Result<()> {
        if !addr.addr.is_unspecified() && !ip.is_local(addr.addr) {
            net_debug!("bind: {} is not ours", addr.addr);
            return Err(Error::Param);
        }
        self.local = addr;
        Ok(())
    }

    /// Set the remote address.
    pub fn connect(&mut self, addr: SockAddr) {
        self.remote = addr;
    }

    /// Apply one of the options every socket has.
    pub fn setopt(&mut self, opt: SockOpt) -> Result<()> {
        match opt {
            SockOpt::RecvTimeout(ms) => self.rcv_tmo = ms,
            SockOpt::SendTimeout(ms) => self.snd_tmo = ms,
            _ => return Err(Error::Param),
        }
        Ok(())
    }
}
