//! Error types for the proxy core.
//!
//! Mirrors the abstract error kinds a connection can observe: transient
//! conditions the pump handles locally, and terminal conditions that abort
//! the connection. We avoid `std::io::Error` as the primary error currency
//! so call sites can match on kind without string comparison; `io::Error`
//! is only used at the socket-adapter boundary.

use std::io;

use thiserror::Error;

/// Errors surfaced by the proxy core's state machines and codecs.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Would block on a non-blocking operation. Transient; the pump
    /// re-registers an async wait.
    #[error("would block")]
    WouldBlock,

    /// Interrupted system call. Transient; retry immediately.
    #[error("interrupted")]
    Interrupted,

    /// Clean end of stream.
    #[error("end of stream")]
    Eof,

    /// A configured timeout (connect, handshake) elapsed.
    #[error("timed out")]
    Timeout,

    /// DNS resolution failed for the requested destination.
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// The upstream or origin refused the TCP/TLS connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// The peer reset the connection (RST_STREAM, TCP RST).
    #[error("connection reset")]
    ConnectionReset,

    /// The peer aborted the connection (GOAWAY, abrupt TLS close).
    #[error("connection aborted")]
    ConnectionAborted,

    /// Malformed input, an auth failure, or a framing violation. Always
    /// fatal for the connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A parser determined the input does not belong to its protocol; the
    /// caller should try the next parser in the auto-detection order.
    #[error("not this protocol")]
    InvalidArgument,

    /// Credentials were presented and did not match.
    #[error("access denied")]
    AccessDenied,

    /// Anything not covered above (I/O errors without a more specific
    /// mapping, allocation failures, etc).
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl RelayError {
    /// True for errors the pump can retry without aborting the connection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WouldBlock | Self::Interrupted)
    }

    /// True for errors that indicate normal stream completion rather than
    /// failure.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

impl From<relay_proto::ProtocolError> for RelayError {
    fn from(err: relay_proto::ProtocolError) -> Self {
        match err {
            relay_proto::ProtocolError::NotThisProtocol => Self::InvalidArgument,
            relay_proto::ProtocolError::AuthenticationFailed => Self::AccessDenied,
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<relay_crypto::CryptoError> for RelayError {
    fn from(err: relay_crypto::CryptoError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Self::WouldBlock,
            io::ErrorKind::Interrupted => Self::Interrupted,
            io::ErrorKind::UnexpectedEof => Self::Eof,
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::ConnectionReset => Self::ConnectionReset,
            io::ErrorKind::ConnectionAborted => Self::ConnectionAborted,
            io::ErrorKind::InvalidData => Self::Protocol(err.to_string()),
            _ => Self::Unexpected(err.to_string()),
        }
    }
}

/// Convert a `RelayError` to `io::Error` for compatibility with `tokio`'s
/// I/O traits at the socket-adapter boundary.
impl From<RelayError> for io::Error {
    fn from(err: RelayError) -> Self {
        let kind = match &err {
            RelayError::WouldBlock => io::ErrorKind::WouldBlock,
            RelayError::Interrupted => io::ErrorKind::Interrupted,
            RelayError::Eof => io::ErrorKind::UnexpectedEof,
            RelayError::Timeout => io::ErrorKind::TimedOut,
            RelayError::HostNotFound(_) => io::ErrorKind::NotFound,
            RelayError::ConnectionRefused => io::ErrorKind::ConnectionRefused,
            RelayError::ConnectionReset => io::ErrorKind::ConnectionReset,
            RelayError::ConnectionAborted => io::ErrorKind::ConnectionAborted,
            RelayError::Protocol(_) => io::ErrorKind::InvalidData,
            RelayError::InvalidArgument => io::ErrorKind::InvalidInput,
            RelayError::AccessDenied => io::ErrorKind::PermissionDenied,
            RelayError::Unexpected(_) => io::ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Convenience alias used throughout `relay-core`.
pub type Result<T> = std::result::Result<T, RelayError>;
