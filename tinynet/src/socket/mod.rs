//! The socket surface and the engine behind it.
//!
//! Application threads never touch a record. Each call becomes a [`Request`] that is carried to
//! the engine thread through a bounded mailbox, executed there against the [`Stack`] and answered
//! with a [`Reply`]. An operation that cannot complete yet answers with a [`Waiter`]; the calling
//! thread parks on it outside the engine and asks again once woken.
//!
//! * [`Sock`] is the part every record starts with and [`SockOps`] the operations each protocol
//!   layer provides on its records.
//! * [`HandleTable`] maps the numbers applications see to records.
//! * [`Stack`] owns all state and executes requests, received datagrams and timers.
//! * [`Engine`] runs a stack on its own thread and [`Sockets`] is the blocking API in front of it.
//!
//! [`Request`]: enum.Request.html
//! [`Reply`]: enum.Reply.html
//! [`Waiter`]: struct.Waiter.html
//! [`Sock`]: struct.Sock.html
//! [`SockOps`]: trait.SockOps.html
//! [`HandleTable`]: struct.HandleTable.html
//! [`Stack`]: struct.Stack.html
//! [`Engine`]: struct.Engine.html
//! [`Sockets`]: struct.Sockets.html
mod addr;
mod api;
mod engine;
mod error;
mod handle;
mod option;
mod request;
mod sock;
mod stack;
mod wait;

pub use self::addr::{
    Fd,
    SockAddr,
    SockType,
    AF_INET,
    IPPROTO_ICMP,
    IPPROTO_TCP,
    IPPROTO_UDP,
    SOCK_DGRAM,
    SOCK_RAW,
    SOCK_STREAM,
};

pub use self::api::Sockets;

pub use self::engine::Engine;

pub use self::error::{Error, Progress, Result};

pub use self::handle::{Handle, HandleTable};

pub use self::option::{
    SockOpt,
    SOL_SOCKET,
    SOL_TCP,
    SO_KEEPALIVE,
    SO_RCVTIMEO,
    SO_SNDTIMEO,
    TCP_KEEPCNT,
    TCP_KEEPIDLE,
    TCP_KEEPINTVL,
};

pub use self::request::{Reply, Request, Response};

pub use self::sock::{Sock, SockKind, SockOps};

pub use self::stack::Stack;

pub use self::wait::{Wait, WaitMask, Waiter};
