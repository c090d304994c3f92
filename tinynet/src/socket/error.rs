use core::fmt;

use crate::wire;

/// The error type of every socket operation.
///
/// "Needs to wait" is deliberately not part of this enum. Operations that cannot complete right
/// away report [`Progress::Wait`] instead, and the caller parks on a wait object.
///
/// [`Progress::Wait`]: enum.Progress.html#variant.Wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument was invalid for the operation.
    Param,

    /// A pool or buffer allocation failed.
    Memory,

    /// A size did not fit, e.g. a header larger than a buffer block.
    Size,

    /// A packet was malformed.
    Broken,

    /// A blocking call did not complete in time.
    Timeout,

    /// No route to the destination, or a segment that makes no sense for the connection.
    Unreachable,

    /// The peer reset the connection.
    Reset,

    /// The connection was closed.
    Closed,

    /// The socket type does not implement this operation.
    NotSupported,

    /// The engine is gone or an operating system primitive failed.
    System,

    /// The socket is in the wrong state for the operation.
    State,

    /// The local address does not belong to this host or is already in use.
    Address,

    /// The socket is already bound or the port is taken.
    Bind,

    /// The listen backlog is full.
    Full,

    /// Nothing available, e.g. no free ephemeral port or no answer to a query.
    None,

    /// The name server refused the query.
    Refused,

    /// The name server failed to answer.
    ServerFailure,

    /// The queried name does not exist.
    NotExist,

    /// The name server could not understand the query.
    Format,

    /// The name server answered with an error code we do not know.
    Unknown,
}

/// The result type of socket operations.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Param         => write!(f, "invalid parameter"),
            Error::Memory        => write!(f, "out of memory"),
            Error::Size          => write!(f, "size mismatch"),
            Error::Broken        => write!(f, "broken packet"),
            Error::Timeout       => write!(f, "timed out"),
            Error::Unreachable   => write!(f, "unreachable"),
            Error::Reset         => write!(f, "connection reset"),
            Error::Closed        => write!(f, "connection closed"),
            Error::NotSupported  => write!(f, "operation not supported"),
            Error::System        => write!(f, "system error"),
            Error::State         => write!(f, "invalid socket state"),
            Error::Address       => write!(f, "address not available"),
            Error::Bind          => write!(f, "already bound"),
            Error::Full          => write!(f, "backlog full"),
            Error::None          => write!(f, "none available"),
            Error::Refused       => write!(f, "query refused"),
            Error::ServerFailure => write!(f, "server failure"),
            Error::NotExist      => write!(f, "name does not exist"),
            Error::Format        => write!(f, "query format error"),
            Error::Unknown       => write!(f, "unknown server error"),
        }
    }
}

impl std::error::Error for Error {}

impl From<wire::Error> for Error {
    fn from(_: wire::Error) -> Self {
        Error::Broken
    }
}

/// The outcome of an operation that may have to be retried after waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<T> {
    /// The operation completed.
    Done(T),
    /// Nothing could be done now. Retry once the matching wait object was woken.
    Wait,
}

impl<T> Progress<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Progress<U> {
        match self {
            Progress::Done(val) => Progress::Done(f(val)),
            Progress::Wait => Progress::Wait,
        }
    }

    pub fn is_wait(&self) -> bool {
        match self {
            Progress::Wait => true,
            Progress::Done(_) => false,
        }
    }
}
