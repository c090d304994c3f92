use std::sync::Arc;

use crate::config::DnsConfig;
use crate::storage::{Locking, Pool};
use crate::wire::Ipv4Address;

use super::engine::Shared;
use super::{Error, Fd, Reply, Request, Response, Result, SockAddr, SockOpt, SockType, AF_INET};

/// The blocking socket calls.
///
/// A cheap handle to a running [`Engine`], clone it for every thread that needs one. Each call
/// is carried to the engine and blocks the calling thread until it completes, fails or runs into
/// the socket's timeout. The engine stops once the last handle is dropped.
///
/// [`Engine`]: struct.Engine.html
#[derive(Clone)]
pub struct Sockets {
    client: Arc<Client>,
}

struct Client {
    shared: Arc<Shared>,
    /// Request slots of the resolver.
    resolver: Pool<usize>,
    /// Milliseconds to wait for a resolver slot.
    slot_timeout: i32,
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl Sockets {
    pub(super) fn new(shared: Arc<Shared>, config: &DnsConfig) -> Self {
        let slots = (0..config.requests).rev().collect();
        let slot_timeout = config.request_timeout.min(i32::max_value() as u64) as i32;
        Sockets {
            client: Arc::new(Client {
                shared,
                resolver: Pool::new(slots, Locking::Thread),
                slot_timeout,
            }),
        }
    }

    #[cfg(test)]
    pub(super) fn shared(&self) -> &Shared {
        &self.client.shared
    }

    fn call(&self, request: Request) -> Result<Reply> {
        self.client.shared.call(request)
    }

    /// Issue a request, parking whenever the engine asks to wait.
    ///
    /// A wakeup with `Closed` is a hint like any other, the request tells the real outcome. Any
    /// other error ends the call.
    fn complete(&self, request: Request) -> Result<Response> {
        loop {
            match self.call(request.clone())? {
                Reply::Done(response) => return Ok(response),
                Reply::Wait(waiter) => match waiter.wait() {
                    Ok(()) | Err(Error::Closed) => (),
                    Err(err) => return Err(err),
                },
            }
        }
    }

    /// Create a socket. `protocol` zero selects the default of `ty`.
    pub fn socket(&self, domain: i32, ty: i32, protocol: i32) -> Result<Fd> {
        if domain != AF_INET {
            return Err(Error::Param);
        }
        let ty = SockType::from_raw(ty)?;
        match self.complete(Request::Create { ty, protocol })? {
            Response::Socket(fd) => Ok(fd),
            _ => Err(Error::System),
        }
    }

    pub fn bind(&self, fd: Fd, addr: SockAddr) -> Result<()> {
        self.complete(Request::Bind { fd, addr }).map(drop)
    }

    pub fn listen(&self, fd: Fd, backlog: i32) -> Result<()> {
        self.complete(Request::Listen { fd, backlog }).map(drop)
    }

    /// Wait for a connection on a listening socket.
    pub fn accept(&self, fd: Fd) -> Result<(Fd, SockAddr)> {
        match self.complete(Request::Accept { fd })? {
            Response::Accepted(conn, peer) => Ok((conn, peer)),
            _ => Err(Error::System),
        }
    }

    /// Set the peer, for streams also wait until the connection is established.
    pub fn connect(&self, fd: Fd, addr: SockAddr) -> Result<()> {
        match self.call(Request::Connect { fd, addr })? {
            Reply::Done(_) => Ok(()),
            Reply::Wait(waiter) => waiter.wait(),
        }
    }

    /// Send all of `data` to the connected peer.
    pub fn send(&self, fd: Fd, data: &[u8]) -> Result<usize> {
        self.send_all(fd, data, None)
    }

    pub fn sendto(&self, fd: Fd, data: &[u8], to: SockAddr) -> Result<usize> {
        self.send_all(fd, data, Some(to))
    }

    /// Send in as many requests as the socket takes, at least one.
    ///
    /// A failure after some data went out reports the part that did.
    fn send_all(&self, fd: Fd, data: &[u8], to: Option<SockAddr>) -> Result<usize> {
        let mut sent = 0;
        loop {
            let request = Request::Send { fd, data: data[sent..].to_vec(), to };
            match self.complete(request) {
                Ok(Response::Sent(count)) => sent += count,
                Ok(_) => return Err(Error::System),
                Err(_) if sent > 0 => return Ok(sent),
                Err(err) => return Err(err),
            }
            if sent >= data.len() {
                return Ok(sent);
            }
        }
    }

    /// Receive into `buf`, zero when the peer closed the connection.
    pub fn recv(&self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        self.recvfrom(fd, buf).map(|(len, _)| len)
    }

    pub fn recvfrom(&self, fd: Fd, buf: &mut [u8]) -> Result<(usize, SockAddr)> {
        match self.complete(Request::Recv { fd, len: buf.len() }) {
            Ok(Response::Received(data, from)) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok((data.len(), from))
            }
            Ok(_) => Err(Error::System),
            Err(Error::Closed) => Ok((0, SockAddr::ANY)),
            Err(err) => Err(err),
        }
    }

    /// Set an option from its raw level, name and value.
    pub fn setsockopt(&self, fd: Fd, level: i32, name: i32, value: &[u8]) -> Result<()> {
        let opt = SockOpt::from_raw(level, name, value)?;
        self.set_option(fd, opt)
    }

    pub fn set_option(&self, fd: Fd, opt: SockOpt) -> Result<()> {
        self.complete(Request::SetOpt { fd, opt }).map(drop)
    }

    /// Close a socket.
    ///
    /// A connection is given the close timeout to shut down in order, after that it is dropped
    /// anyway. The socket number is free for reuse when this returns.
    pub fn close(&self, fd: Fd) -> Result<()> {
        let waiter = match self.call(Request::Close { fd })? {
            Reply::Done(_) => return Ok(()),
            Reply::Wait(waiter) => waiter,
        };
        let result = waiter.wait();
        self.call(Request::Destroy { fd })?;
        match result {
            Ok(()) | Err(Error::Closed) | Err(Error::Timeout) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Resolve a host name to an address.
    ///
    /// Waits for a free resolver slot first, then for the answer. Both waits are bounded by the
    /// request timeout.
    pub fn gethostbyname(&self, name: &str) -> Result<Ipv4Address> {
        let slot = self.client.resolver.alloc(self.client.slot_timeout).ok_or(Error::Timeout)?;
        let result = self.resolve(name, slot);
        self.client.resolver.free(slot);
        result
    }

    fn resolve(&self, name: &str, slot: usize) -> Result<Ipv4Address> {
        let request = Request::Resolve { name: name.to_owned(), slot };
        loop {
            let waiter = match self.call(request.clone())? {
                Reply::Done(Response::Resolved(addr)) => return Ok(addr),
                Reply::Done(_) => return Err(Error::System),
                Reply::Wait(waiter) => waiter,
            };
            // Whatever was posted, asking again collects the outcome.
            if let Err(Error::Timeout) = waiter.wait() {
                return match self.call(request)? {
                    Reply::Done(Response::Resolved(addr)) => Ok(addr),
                    _ => Err(Error::Timeout),
                };
            }
        }
    }
}
