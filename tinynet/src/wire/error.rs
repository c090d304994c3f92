use core::fmt;

/// The error type for parsing and checking headers.
///
/// None of these ever reaches an application. A packet that fails to parse is dropped where the
/// failure is detected and the error is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The buffer may be shorter than the minimum header, or a length field may claim more data
    /// than was actually received.
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    WrongChecksum,

    /// An incoming packet could not be recognized and was dropped.
    ///
    /// E.g. an IP packet with a version other than 4.
    Unrecognized,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Examples: a TCP header without any flag set; a TCP header with a data offset pointing into
    /// the fixed header; a UDP packet with a zero destination port.
    Malformed,

    /// Parsing depends on a feature this stack does not implement, such as IP fragments.
    Unsupported,
}

/// The result type for header codecs.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Unrecognized  => write!(f, "unrecognized packet"),
            Error::Unsupported   => write!(f, "unsupported feature"),
            Error::Malformed     => write!(f, "malformed packet"),
        }
    }
}

impl std::error::Error for Error {}
