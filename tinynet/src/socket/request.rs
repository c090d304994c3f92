use core::fmt;

use crate::wire::Ipv4Address;

use super::{Fd, SockAddr, SockOpt, SockType};
use super::wait::Waiter;

/// One operation to run on the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Create { ty: SockType, protocol: i32 },
    Bind { fd: Fd, addr: SockAddr },
    Listen { fd: Fd, backlog: i32 },
    Accept { fd: Fd },
    Connect { fd: Fd, addr: SockAddr },
    /// Send to `to`, or to the connected peer without one.
    Send { fd: Fd, data: Vec<u8>, to: Option<SockAddr> },
    Recv { fd: Fd, len: usize },
    SetOpt { fd: Fd, opt: SockOpt },
    /// Start closing. The number stays taken until `Destroy` when this has to wait.
    Close { fd: Fd },
    Destroy { fd: Fd },
    /// Look up a name, remembering the query under the caller's request slot.
    Resolve { name: String, slot: usize },
}

/// The result of a completed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    None,
    Socket(Fd),
    Accepted(Fd, SockAddr),
    /// Octets taken into the socket, possibly fewer than offered.
    Sent(usize),
    Received(Vec<u8>, SockAddr),
    Resolved(Ipv4Address),
}

/// What the engine answers to a request.
pub enum Reply {
    Done(Response),
    /// Park on the waiter. For `Connect` and `Close` the posted result is the outcome, every
    /// other request is issued again once woken.
    Wait(Waiter),
}

impl Request {
    /// The socket the request operates on.
    pub fn fd(&self) -> Option<Fd> {
        match self {
            Request::Create { .. } | Request::Resolve { .. } => None,
            Request::Bind { fd, .. }
            | Request::Listen { fd, .. }
            | Request::Accept { fd }
            | Request::Connect { fd, .. }
            | Request::Send { fd, .. }
            | Request::Recv { fd, .. }
            | Request::SetOpt { fd, .. }
            | Request::Close { fd }
            | Request::Destroy { fd } => Some(*fd),
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reply::Done(response) => f.debug_tuple("Done").field(response).finish(),
            Reply::Wait(waiter) => f.debug_tuple("Wait").field(waiter).finish(),
        }
    }
}
